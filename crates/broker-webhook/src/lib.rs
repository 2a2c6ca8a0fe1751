//! Delivery adapters for handing a batch of events to a consumer.
//!
//! `HttpDeliveryAdapter` is the production transport: one POST per batch,
//! JSON body, 30s timeout, `X-Correlation-ID` header. `InMemoryDeliveryAdapter`
//! exists so dispatcher tests can assert on delivered batches without a
//! listening socket.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use broker_types::Event;
use serde::Serialize;
use uuid::Uuid;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct DeliveryBody<'a> {
    #[serde(rename = "consumerId")]
    consumer_id: Uuid,
    events: &'a [Event],
}

/// Raised when a batch could not be delivered. Carries enough context for
/// the dispatcher's retry policy to log a useful message; it does not
/// itself decide whether the failure is retryable.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery to {consumer_id} failed with status {status}")]
    NonSuccessStatus { consumer_id: Uuid, status: u16 },
    #[error("delivery to {consumer_id} timed out or failed to connect: {source}")]
    Transport { consumer_id: Uuid, #[source] source: reqwest::Error },
}

#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    async fn deliver(&self, consumer_id: Uuid, callback: &str, correlation_id: Uuid, events: &[Event]) -> Result<(), DeliveryError>;
}

pub struct HttpDeliveryAdapter {
    client: reqwest::Client,
}

impl HttpDeliveryAdapter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("reqwest client with static config always builds");
        Self { client }
    }
}

impl Default for HttpDeliveryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryAdapter for HttpDeliveryAdapter {
    async fn deliver(&self, consumer_id: Uuid, callback: &str, correlation_id: Uuid, events: &[Event]) -> Result<(), DeliveryError> {
        let body = DeliveryBody { consumer_id, events };

        let response = self
            .client
            .post(callback)
            .header("Content-Type", "application/json")
            .header("X-Correlation-ID", correlation_id.to_string())
            .json(&body)
            .send()
            .await
            .map_err(|source| DeliveryError::Transport { consumer_id, source })?;

        if !response.status().is_success() {
            return Err(DeliveryError::NonSuccessStatus { consumer_id, status: response.status().as_u16() });
        }

        tracing::debug!(%consumer_id, event_count = events.len(), "delivered batch");
        Ok(())
    }
}

/// Records delivered batches per handler id instead of making a real HTTP
/// call. Used by consumers registered with `ConsumerTransport::InMemory`.
#[derive(Default)]
pub struct InMemoryDeliveryAdapter {
    delivered: Mutex<HashMap<String, Vec<Vec<Event>>>>,
}

impl InMemoryDeliveryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries_for(&self, handler_id: &str) -> Vec<Vec<Event>> {
        self.delivered.lock().expect("mutex poisoned").get(handler_id).cloned().unwrap_or_default()
    }

    pub fn record(&self, handler_id: &str, batch: Vec<Event>) {
        self.delivered.lock().expect("mutex poisoned").entry(handler_id.to_string()).or_default().push(batch);
    }
}

#[async_trait]
impl DeliveryAdapter for InMemoryDeliveryAdapter {
    /// `callback` is the consumer's `handler_id` for this transport, not a URL.
    async fn deliver(&self, _consumer_id: Uuid, callback: &str, _correlation_id: Uuid, events: &[Event]) -> Result<(), DeliveryError> {
        self.record(callback, events.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Read;

    fn sample_event(id: &str) -> Event {
        Event { id: id.to_string(), timestamp: chrono::Utc::now(), event_type: "invoice.created".into(), payload: json!({"amount": 1}) }
    }

    #[tokio::test]
    async fn posts_json_body_with_correlation_header() {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("server");
        let addr = server.server_addr();
        let url = format!("http://{addr}/webhook");

        let handle = std::thread::spawn(move || {
            let mut request = server.recv().expect("recv");
            let mut body = String::new();
            request.as_reader().read_to_string(&mut body).expect("read body");
            let correlation = request
                .headers()
                .iter()
                .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case("X-Correlation-ID"))
                .map(|h| h.value.as_str().to_string());
            request.respond(tiny_http::Response::from_string("ok")).expect("respond");
            (body, correlation)
        });

        let adapter = HttpDeliveryAdapter::new();
        let consumer_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        let events = vec![sample_event("acme/billing/invoices-1")];
        adapter.deliver(consumer_id, &url, correlation_id, &events).await.expect("deliver");

        let (body, correlation) = handle.join().expect("server thread");
        assert!(body.contains("invoices-1"));
        assert_eq!(correlation, Some(correlation_id.to_string()));
    }

    #[tokio::test]
    async fn non_2xx_status_is_a_delivery_error() {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("server");
        let addr = server.server_addr();
        let url = format!("http://{addr}/webhook");

        let handle = std::thread::spawn(move || {
            let request = server.recv().expect("recv");
            request
                .respond(tiny_http::Response::from_string("nope").with_status_code(500))
                .expect("respond");
        });

        let adapter = HttpDeliveryAdapter::new();
        let err = adapter
            .deliver(Uuid::new_v4(), &url, Uuid::new_v4(), &[sample_event("acme/billing/invoices-1")])
            .await
            .expect_err("should fail");
        assert!(matches!(err, DeliveryError::NonSuccessStatus { status: 500, .. }));
        handle.join().expect("server thread");
    }

    #[test]
    fn in_memory_adapter_records_batches() {
        let adapter = InMemoryDeliveryAdapter::new();
        adapter.record("h1", vec![sample_event("acme/billing/invoices-1")]);
        assert_eq!(adapter.deliveries_for("h1").len(), 1);
        assert!(adapter.deliveries_for("h2").is_empty());
    }
}
