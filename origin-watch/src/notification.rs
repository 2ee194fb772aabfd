//! Alert sinks: log output and webhook dispatch.
//!
//! Webhooks are fire-and-forget HTTP POSTs of the alert record as JSON, each
//! bounded by the request timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use origin_core::AlertRecord;

use crate::error::{with_timeout, Result, WatchError};

/// Receives finished alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: &AlertRecord);
}

/// Emits the alert text at info level.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn send(&self, alert: &AlertRecord) {
        info!(hex = %alert.hex, "{}", alert.text());
    }
}

/// Dispatches alerts to a webhook URL via HTTP POST.
#[derive(Clone)]
pub struct WebhookDispatcher {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookDispatcher {
    pub fn new(client: reqwest::Client, url: &str, timeout: Duration) -> Self {
        WebhookDispatcher {
            url: url.to_string(),
            client,
            timeout,
        }
    }

    pub fn payload(alert: &AlertRecord) -> serde_json::Value {
        serde_json::json!({
            "hex": alert.hex,
            "craft": alert.craft_summary,
            "origin": alert.origin_description,
            "nationality": alert.nationality_label,
            "text": alert.text(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookDispatcher {
    async fn send(&self, alert: &AlertRecord) {
        let payload = Self::payload(alert);
        let client = self.client.clone();
        let url = self.url.clone();
        let timeout = self.timeout;
        let hex = alert.hex.clone();

        tokio::spawn(async move {
            if let Err(e) = deliver(&client, &url, &payload, timeout).await {
                error!(%hex, "webhook delivery failed: {e}");
            }
        });
    }
}

async fn deliver(
    client: &reqwest::Client,
    url: &str,
    payload: &serde_json::Value,
    timeout: Duration,
) -> Result<()> {
    let resp = with_timeout("webhook", timeout, async {
        Ok(client.post(url).json(payload).send().await?)
    })
    .await?;

    let status = resp.status();
    if !status.is_success() {
        return Err(WatchError::Status {
            what: "webhook".to_string(),
            status,
        });
    }
    Ok(())
}

/// Fans each alert out to every configured sink.
#[derive(Clone, Default)]
pub struct Notifier {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }
}

#[async_trait]
impl AlertSink for Notifier {
    async fn send(&self, alert: &AlertRecord) {
        for sink in &self.sinks {
            sink.send(alert).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use tokio::sync::Mutex;

    /// Collects alerts for assertions.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub alerts: Mutex<Vec<AlertRecord>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn send(&self, alert: &AlertRecord) {
            self.alerts.lock().await.push(alert.clone());
        }
    }

    fn alert() -> AlertRecord {
        AlertRecord {
            hex: "4b1805".into(),
            craft_summary: "CESSNA 172 (HB-CQR)".into(),
            origin_description: "Zurich Airport (ZRH), Switzerland".into(),
            nationality_label: "Swiss".into(),
        }
    }

    #[test]
    fn test_webhook_dispatcher_creation() {
        let wh = WebhookDispatcher::new(
            reqwest::Client::new(),
            "https://example.com/hook",
            Duration::from_secs(5),
        );
        assert_eq!(wh.url, "https://example.com/hook");
        assert_eq!(wh.timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_webhook_gives_up_on_silent_endpoint() {
        // Accepts the connection and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let err = deliver(
            &reqwest::Client::new(),
            &format!("http://{addr}/hook"),
            &WebhookDispatcher::payload(&alert()),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WatchError::Timeout { .. }));
        server.abort();
    }

    #[test]
    fn test_webhook_payload() {
        let payload = WebhookDispatcher::payload(&alert());
        assert_eq!(payload["hex"], "4b1805");
        assert_eq!(payload["nationality"], "Swiss");
        assert_eq!(
            payload["text"],
            "Swiss CESSNA 172 (HB-CQR) started from Zurich Airport (ZRH), Switzerland"
        );
    }

    #[tokio::test]
    async fn test_notifier_fans_out() {
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        let notifier = Notifier::new()
            .with_sink(a.clone())
            .with_sink(Arc::new(LogSink))
            .with_sink(b.clone());
        assert_eq!(notifier.len(), 3);

        notifier.send(&alert()).await;
        assert_eq!(a.alerts.lock().await.len(), 1);
        assert_eq!(b.alerts.lock().await[0], alert());
    }
}
