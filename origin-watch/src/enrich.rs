//! Per-aircraft enrichment and the bounded worker pool that runs it.
//!
//! The driver loop hands each newly qualifying craft to [`EnrichPool::dispatch`]
//! and moves on. Workers pull from one shared bounded queue, so a slow
//! collaborator throttles dispatch instead of growing memory. A failed or
//! timed-out job is logged against its hex and the worker continues.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use origin_core::{find_origin, nationality_for, AlertRecord, Craft, Point, PrefixTable};

use crate::error::{with_timeout, Result};
use crate::geocode::GeoResolver;
use crate::notification::AlertSink;
use crate::sources::TraceStore;

/// Fallback description when the trace carries none.
const UNKNOWN_AIRCRAFT: &str = "Unknown aircraft";

/// Start of an aircraft's current leg.
#[derive(Debug, Clone, PartialEq)]
pub struct LegOrigin {
    /// Aircraft description from the trace store.
    pub description: Option<String>,
    pub point: Point,
    /// Geocoded place, or the coordinates when nothing resolved.
    pub place: String,
}

/// Turns a selected craft into an alert record.
pub struct Enricher {
    traces: Arc<dyn TraceStore>,
    geo: GeoResolver,
    prefixes: Arc<PrefixTable>,
}

impl Enricher {
    pub fn new(traces: Arc<dyn TraceStore>, geo: GeoResolver, prefixes: Arc<PrefixTable>) -> Self {
        Enricher {
            traces,
            geo,
            prefixes,
        }
    }

    /// Where `hex`'s current leg began, described as a place.
    pub async fn locate(&self, hex: &str) -> Result<LegOrigin> {
        let pair = self.traces.fetch_traces(hex).await?;
        let point = find_origin(&pair.historic, &pair.recent)?;
        debug!(%hex, origin = %point, "leg origin");

        let mut place = self.geo.describe(point).await?;
        if place.is_empty() {
            place = point.to_string();
        }
        Ok(LegOrigin {
            description: pair.description().map(String::from),
            point,
            place,
        })
    }

    /// Trace fetch, origin reconstruction, geocode, and nationality lookup.
    pub async fn enrich(&self, craft: &Craft) -> Result<AlertRecord> {
        let nationality = craft
            .registration
            .as_deref()
            .map(|reg| self.nationality(reg))
            .unwrap_or_default();

        let origin = self.locate(&craft.hex).await?;
        let description = origin
            .description
            .as_deref()
            .or(craft.type_code.as_deref())
            .unwrap_or(UNKNOWN_AIRCRAFT);

        Ok(AlertRecord::new(craft, description, origin.place, nationality))
    }

    pub fn nationality(&self, registration: &str) -> String {
        nationality_for(registration, &self.prefixes)
    }
}

/// Fixed set of enrichment workers over a bounded queue.
pub struct EnrichPool {
    tx: mpsc::Sender<Craft>,
    workers: Vec<JoinHandle<()>>,
}

impl EnrichPool {
    pub fn start(
        enricher: Arc<Enricher>,
        workers: usize,
        capacity: usize,
        job_timeout: Duration,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..workers.max(1))
            .map(|id| {
                let rx = rx.clone();
                let enricher = enricher.clone();
                let sink = sink.clone();
                tokio::spawn(worker(id, rx, enricher, job_timeout, sink))
            })
            .collect();

        EnrichPool { tx, workers }
    }

    /// Queue a craft, waiting for space when the queue is full.
    ///
    /// Returns `false` once every worker has exited.
    pub async fn dispatch(&self, craft: Craft) -> bool {
        self.tx.send(craft).await.is_ok()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// True once every worker has exited and dispatch can no longer succeed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Close the queue and wait for queued jobs to finish.
    pub async fn drain(self) {
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.await;
        }
    }

    /// Stop at once, abandoning queued and in-flight jobs.
    pub fn abort(&self) {
        for handle in &self.workers {
            handle.abort();
        }
    }
}

async fn worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Craft>>>,
    enricher: Arc<Enricher>,
    job_timeout: Duration,
    sink: Arc<dyn AlertSink>,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(craft) = next else {
            break;
        };

        match with_timeout("enrichment", job_timeout, enricher.enrich(&craft)).await {
            Ok(alert) => {
                info!(worker = id, hex = %craft.hex, "alert ready");
                sink.send(&alert).await;
            }
            Err(e) => warn!(worker = id, hex = %craft.hex, "enrichment failed: {e}"),
        }
    }
    debug!(worker = id, "enrichment worker stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
