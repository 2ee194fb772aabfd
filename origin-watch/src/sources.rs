//! Live snapshot feed and per-aircraft trace store clients.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use origin_core::{Snapshot, TraceLog};

use crate::error::{with_timeout, Result, WatchError};

/// Source of live aircraft snapshots.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<Snapshot>;
}

/// Historic and recent trace logs for one aircraft.
#[derive(Debug, Clone, Default)]
pub struct TracePair {
    pub historic: TraceLog,
    pub recent: TraceLog,
}

impl TracePair {
    /// Aircraft description carried by the recent log.
    pub fn description(&self) -> Option<&str> {
        self.recent.desc.as_deref().filter(|d| !d.trim().is_empty())
    }
}

/// Per-aircraft trace storage.
#[async_trait]
pub trait TraceStore: Send + Sync {
    async fn fetch_traces(&self, hex: &str) -> Result<TracePair>;
}

// ---------------------------------------------------------------------------
// HTTP implementations
// ---------------------------------------------------------------------------

/// GETs the snapshot JSON from a fixed URL.
#[derive(Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpSnapshotSource {
    pub fn new(client: reqwest::Client, url: &str, timeout: Duration) -> Self {
        HttpSnapshotSource {
            client,
            url: url.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        with_timeout("snapshot", self.timeout, async {
            let text = get_text(&self.client, &self.url, "snapshot").await?;
            let snapshot: Snapshot = serde_json::from_str(&text)?;
            debug!(aircraft = snapshot.aircraft.len(), "snapshot fetched");
            Ok(snapshot)
        })
        .await
    }
}

/// Reads readsb-style trace files beneath a base URL.
#[derive(Clone)]
pub struct HttpTraceStore {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTraceStore {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        HttpTraceStore {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// `{base}/data/traces/{last two hex chars}/trace_{kind}_{hex}.json`
    pub fn trace_url(&self, hex: &str, kind: &str) -> String {
        let hex = hex.to_lowercase();
        let bucket = hex.get(hex.len().saturating_sub(2)..).unwrap_or(&hex);
        format!(
            "{}/data/traces/{bucket}/trace_{kind}_{hex}.json",
            self.base_url
        )
    }

    async fn fetch_log(&self, hex: &str, kind: &str) -> Result<TraceLog> {
        let url = self.trace_url(hex, kind);
        let text = get_text(&self.client, &url, &format!("trace_{kind}")).await?;
        Ok(TraceLog::from_json(&text)?)
    }
}

#[async_trait]
impl TraceStore for HttpTraceStore {
    async fn fetch_traces(&self, hex: &str) -> Result<TracePair> {
        with_timeout("traces", self.timeout, async {
            let (recent, historic) =
                tokio::try_join!(self.fetch_log(hex, "recent"), self.fetch_log(hex, "full"))?;
            debug!(
                %hex,
                historic = historic.trace.len(),
                recent = recent.trace.len(),
                "traces fetched"
            );
            Ok(TracePair { historic, recent })
        })
        .await
    }
}

/// GET `url`, failing on non-success status.
pub(crate) async fn get_text(client: &reqwest::Client, url: &str, what: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(WatchError::Status {
            what: what.to_string(),
            status,
        });
    }
    Ok(response.text().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(base: &str) -> HttpTraceStore {
        HttpTraceStore::new(reqwest::Client::new(), base, Duration::from_secs(1))
    }

    #[test]
    fn test_trace_url_layout() {
        let store = store("https://globe.example.com/");
        assert_eq!(
            store.trace_url("4CA7B5", "recent"),
            "https://globe.example.com/data/traces/b5/trace_recent_4ca7b5.json"
        );
        assert_eq!(
            store.trace_url("4ca7b5", "full"),
            "https://globe.example.com/data/traces/b5/trace_full_4ca7b5.json"
        );
    }

    #[test]
    fn test_trace_url_short_hex() {
        assert_eq!(
            store("http://h").trace_url("a", "full"),
            "http://h/data/traces/a/trace_full_a.json"
        );
    }

    #[test]
    fn test_description_from_recent_log() {
        let mut pair = TracePair::default();
        assert_eq!(pair.description(), None);
        pair.historic.desc = Some("ignored".into());
        pair.recent.desc = Some("BOEING 737-800".into());
        assert_eq!(pair.description(), Some("BOEING 737-800"));
    }
}
