//! Mirroring of outbound events to a secondary process

use super::{EventForwarder, StreamEvent};
use reqwest::Client;
use std::time::Duration;

const FORWARD_TIMEOUT: Duration = Duration::from_secs(2);

/// POSTs each event as JSON on its own task; failures are logged and dropped
pub struct HttpForwarder {
    client: Client,
    url: String,
}

impl HttpForwarder {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl EventForwarder for HttpForwarder {
    fn forward(&self, event: &StreamEvent) {
        let request = self
            .client
            .post(&self.url)
            .timeout(FORWARD_TIMEOUT)
            .json(event);
        let url = self.url.clone();

        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::debug!(url = %url, status = %response.status(), "Forward target rejected event");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "Failed to forward event");
                }
            }
        });
    }
}

/// Forwarding disabled
pub struct NoopForwarder;

impl EventForwarder for NoopForwarder {
    fn forward(&self, _event: &StreamEvent) {}
}
