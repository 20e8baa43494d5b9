//! Outbound webhook delivery. Fire-and-forget: delivery runs on a spawned
//! task and failures are logged, never surfaced to the request.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use crate::webhooks::models::WebhookEvent;
use crate::webhooks::store::WebhookStore;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct WebhookDispatcher {
    store: Arc<WebhookStore>,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(store: Arc<WebhookStore>) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
        }
    }

    /// Notify every active subscription in the tenant for `event`. Returns
    /// immediately; deliveries happen in the background.
    pub fn notify(&self, customer_id: &str, event: WebhookEvent, payload: serde_json::Value) {
        let subscribers = match self.store.subscribers(customer_id, event) {
            Ok(subs) => subs,
            Err(e) => {
                warn!("failed to load webhook subscribers: {e:#}");
                return;
            }
        };
        if subscribers.is_empty() {
            return;
        }

        let body = json!({
            "event": event.as_str(),
            "payload": payload,
        });

        for config in subscribers {
            let client = self.client.clone();
            let body = body.clone();
            let event_name = event.as_str();
            tokio::spawn(async move {
                let result = client
                    .post(&config.url)
                    .timeout(DELIVERY_TIMEOUT)
                    .json(&body)
                    .send()
                    .await;
                match result {
                    Ok(resp) if resp.status().is_success() => {
                        debug!(url = %config.url, event = event_name, "webhook delivered");
                    }
                    Ok(resp) => {
                        warn!(
                            url = %config.url,
                            event = event_name,
                            status = %resp.status(),
                            "webhook delivery rejected"
                        );
                    }
                    Err(e) => {
                        warn!(url = %config.url, event = event_name, "webhook delivery failed: {e}");
                    }
                }
            });
        }
    }
}
