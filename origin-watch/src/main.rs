//! adsb-origin: watch a region and report where entering aircraft took off.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use comfy_table::{Cell, Table};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use origin_core::config::{self, Config, RegionConfig};
use origin_core::prefixes;
use origin_core::{handle_snapshot, OriginError, Point, PrefixTable, TrackingState};

mod enrich;
mod error;
mod geocode;
mod notification;
mod overpass;
mod sources;

use enrich::{EnrichPool, Enricher};
use error::{Result, WatchError};
use geocode::GeoResolver;
use notification::{LogSink, Notifier, WebhookDispatcher};
use overpass::OverpassClient;
use sources::{HttpSnapshotSource, HttpTraceStore, SnapshotSource};

#[derive(Parser)]
#[command(
    name = "adsb-origin",
    version,
    about = "Alert on aircraft entering a region, with where their flight began"
)]
struct Cli {
    /// Config file (default: ~/.adsb-origin/config.yaml)
    #[arg(long, global = true, env = "ADSB_ORIGIN_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the live feed and alert on aircraft entering the region
    Watch {
        #[command(flatten)]
        region: RegionArgs,

        /// Snapshot JSON endpoint
        #[arg(long)]
        aircraft_url: Option<String>,

        /// Trace store base URL
        #[arg(long)]
        trace_base_url: Option<String>,

        /// Also POST alerts to this URL
        #[arg(long)]
        webhook: Option<String>,
    },

    /// Find and describe where an aircraft's current leg began
    Origin {
        /// ICAO hex identifier
        hex: String,

        /// Registration, for the nationality column
        #[arg(short, long)]
        registration: Option<String>,

        /// Trace store base URL
        #[arg(long)]
        trace_base_url: Option<String>,
    },

    /// Reverse-geocode a coordinate to airport, city and country
    Geocode {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
    },

    /// Look up nationality labels for registrations
    Nationality {
        #[arg(required = true)]
        registrations: Vec<String>,
    },

    /// Build a prefix table from scraped country rows
    BuildPrefixes {
        /// JSON object of country -> { prefixes_text, demonym_raw }
        input: PathBuf,
        /// Output prefix table JSON
        output: PathBuf,
    },

    /// Write a config template
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Region overrides applied on top of the config file.
#[derive(Args)]
struct RegionArgs {
    #[arg(long, allow_negative_numbers = true)]
    lat_min: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    lat_max: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    lon_min: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    lon_max: Option<f64>,
    /// Altitude ceiling in feet
    #[arg(long)]
    max_height: Option<f64>,
    /// Required heading in degrees [0, 360)
    #[arg(long)]
    direction: Option<f64>,
    /// Type code to ignore (repeatable)
    #[arg(long = "exclude-type")]
    exclude_types: Vec<String>,
}

impl RegionArgs {
    fn apply(self, config: &mut Config) {
        let region = &mut config.region;
        let overrides = [
            (&mut region.lat_min, self.lat_min),
            (&mut region.lat_max, self.lat_max),
            (&mut region.lon_min, self.lon_min),
            (&mut region.lon_max, self.lon_max),
            (&mut region.max_height_ft, self.max_height),
            (&mut region.direction_deg, self.direction),
        ];
        for (slot, value) in overrides {
            if value.is_some() {
                *slot = value;
            }
        }
        if !self.exclude_types.is_empty() {
            region.exclude_types = self.exclude_types;
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Watch {
            region,
            aircraft_url,
            trace_base_url,
            webhook,
        } => {
            let mut config = config;
            region.apply(&mut config);
            config.sources.aircraft_url = aircraft_url.or(config.sources.aircraft_url);
            config.sources.trace_base_url = trace_base_url.or(config.sources.trace_base_url);
            config.webhook = webhook.or(config.webhook);
            cmd_watch(config).await
        }
        Commands::Origin {
            hex,
            registration,
            trace_base_url,
        } => {
            let mut config = config;
            config.sources.trace_base_url = trace_base_url.or(config.sources.trace_base_url);
            cmd_origin(&config, &hex, registration.as_deref()).await
        }
        Commands::Geocode { lat, lon } => cmd_geocode(&config, Point::new(lat, lon)).await,
        Commands::Nationality { registrations } => cmd_nationality(&config, &registrations),
        Commands::BuildPrefixes { input, output } => cmd_build_prefixes(&input, &output),
        Commands::Init { force } => cmd_init(&config, cli.config, force),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("adsb-origin/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

fn required<'a>(value: &'a Option<String>, key: &str, flag: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| OriginError::Config(format!("{key} is not set (config file or {flag})")).into())
}

fn request_timeout(config: &Config) -> Duration {
    Duration::from_secs(config.watch.request_timeout_sec.max(1))
}

fn load_prefixes(config: &Config) -> Result<PrefixTable> {
    let table = match &config.sources.prefixes_path {
        Some(path) => PrefixTable::load(Path::new(path))?,
        None => PrefixTable::builtin()?,
    };
    Ok(table)
}

fn geo_resolver(config: &Config, client: &reqwest::Client) -> GeoResolver {
    GeoResolver::new(Arc::new(OverpassClient::new(
        client.clone(),
        &config.sources.overpass_url,
        request_timeout(config),
    )))
}

fn enricher(config: &Config, client: &reqwest::Client) -> Result<Enricher> {
    let base = required(&config.sources.trace_base_url, "sources.trace_base_url", "--trace-base-url")?;
    let traces = HttpTraceStore::new(client.clone(), base, request_timeout(config));
    Ok(Enricher::new(
        Arc::new(traces),
        geo_resolver(config, client),
        Arc::new(load_prefixes(config)?),
    ))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_watch(config: Config) -> Result<()> {
    let region = RegionConfig::new(&config.region)?;
    let client = http_client()?;
    let aircraft_url = required(&config.sources.aircraft_url, "sources.aircraft_url", "--aircraft-url")?;
    let source = HttpSnapshotSource::new(client.clone(), aircraft_url, request_timeout(&config));

    let idle_hours = config.watch.idle_timeout_hours;
    let idle_limit = Duration::try_from_secs_f64(idle_hours * 3600.0)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| {
            OriginError::Config(format!("watch.idle_timeout_hours ({idle_hours}) must be positive"))
        })?;

    let mut notifier = Notifier::new().with_sink(Arc::new(LogSink));
    if let Some(url) = &config.webhook {
        notifier = notifier.with_sink(Arc::new(WebhookDispatcher::new(
            client.clone(),
            url,
            request_timeout(&config),
        )));
    }

    // Trace fetch plus up to two spatial queries per job.
    let job_timeout = request_timeout(&config) * 3;
    let pool = EnrichPool::start(
        Arc::new(enricher(&config, &client)?),
        config.watch.workers,
        config.watch.queue_capacity,
        job_timeout,
        Arc::new(notifier.clone()),
    );

    info!(
        lat = %format!("{}..{}", region.lat_min, region.lat_max),
        lon = %format!("{}..{}", region.lon_min, region.lon_max),
        max_height_ft = ?region.max_height_ft,
        direction_deg = ?region.direction_deg,
        workers = pool.worker_count(),
        sinks = notifier.len(),
        "watching region"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    let mut state = TrackingState::new();
    let exit = run_watch(
        &source,
        &region,
        &pool,
        &mut state,
        Duration::from_secs(config.watch.poll_interval_sec.max(1)),
        idle_limit,
        shutdown,
    )
    .await;

    info!(?exit, alerted = state.seen_count(), "watch finished");
    pool.abort();
    Ok(())
}

/// Why [`run_watch`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchExit {
    Interrupted,
    Idle,
    PoolClosed,
}

/// Poll `source` every `poll` and dispatch newly qualifying craft to `pool`
/// until `shutdown` resolves, `idle` elapses, or the pool closes.
///
/// A failed poll is logged and skipped.
async fn run_watch<F>(
    source: &dyn SnapshotSource,
    region: &RegionConfig,
    pool: &EnrichPool,
    state: &mut TrackingState,
    poll: Duration,
    idle: Duration,
    shutdown: F,
) -> WatchExit
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let idle_timer = tokio::time::sleep(idle);
    tokio::pin!(idle_timer, shutdown);

    'watch: loop {
        tokio::select! {
            _ = ticker.tick() => {
                if pool.is_closed() {
                    warn!("enrichment pool closed");
                    break 'watch WatchExit::PoolClosed;
                }
                let snapshot = match source.fetch_snapshot().await {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("poll failed: {e}");
                        continue;
                    }
                };
                for craft in handle_snapshot(&snapshot, region, state) {
                    info!(
                        hex = %craft.hex,
                        callsign = craft.callsign().unwrap_or("-"),
                        altitude_ft = craft.altitude_ft,
                        "aircraft entered region"
                    );
                    if !pool.dispatch(craft).await {
                        warn!("enrichment pool closed");
                        break 'watch WatchExit::PoolClosed;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("interrupted, stopping");
                break WatchExit::Interrupted;
            }
            _ = &mut idle_timer => {
                info!(secs = idle.as_secs(), "idle timeout reached, stopping");
                break WatchExit::Idle;
            }
        }
    }
}

async fn cmd_origin(config: &Config, hex: &str, registration: Option<&str>) -> Result<()> {
    let client = http_client()?;
    let enricher = enricher(config, &client)?;
    let origin = enricher.locate(hex).await?;
    let nationality = registration
        .map(|reg| enricher.nationality(reg))
        .unwrap_or_default();

    let mut table = Table::new();
    table.set_header(vec!["Hex", "Aircraft", "Registration", "Nationality", "Origin", "Position"]);
    table.add_row(vec![
        Cell::new(hex),
        Cell::new(origin.description.as_deref().unwrap_or("-")),
        Cell::new(registration.unwrap_or("-")),
        Cell::new(if nationality.is_empty() { "-" } else { nationality.as_str() }),
        Cell::new(&origin.place),
        Cell::new(origin.point),
    ]);
    println!("{table}");
    Ok(())
}

async fn cmd_geocode(config: &Config, point: Point) -> Result<()> {
    let client = http_client()?;
    let resolution = geo_resolver(config, &client).resolve(point).await?;

    let mut table = Table::new();
    table.set_header(vec!["Airport", "City", "Country"]);
    table.add_row(vec![
        Cell::new(resolution.airport_name.as_deref().unwrap_or("-")),
        Cell::new(resolution.city_name.as_deref().unwrap_or("-")),
        Cell::new(resolution.country_name.as_deref().unwrap_or("-")),
    ]);
    println!("{table}");
    if resolution.is_empty() {
        println!("Nothing found near {point}");
    } else {
        println!("{resolution}");
    }
    Ok(())
}

fn cmd_nationality(config: &Config, registrations: &[String]) -> Result<()> {
    let prefixes = load_prefixes(config)?;

    let mut table = Table::new();
    table.set_header(vec!["Registration", "Prefix", "Nationality"]);
    for reg in registrations {
        let prefix = prefixes.longest_match(reg).map_or("-", |entry| entry.prefix);
        let label = origin_core::nationality_for(reg, &prefixes);
        table.add_row(vec![
            Cell::new(reg),
            Cell::new(prefix),
            Cell::new(if label.is_empty() { "-" } else { label.as_str() }),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn cmd_build_prefixes(input: &Path, output: &Path) -> Result<()> {
    let rows = prefixes::parse_rows(&std::fs::read_to_string(input)?)?;
    let table = prefixes::build_prefix_table(&rows);
    std::fs::write(output, table.to_json()?)?;
    println!(
        "Wrote {} prefixes for {} countries to {}",
        table.len(),
        rows.len(),
        output.display()
    );
    Ok(())
}

fn cmd_init(config: &Config, path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(config::config_file);
    if path.exists() && !force {
        return Err(WatchError::Origin(OriginError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ))));
    }
    config::save_config(config, &path)?;
    println!("Wrote {}", path.display());
    println!("Set the region bounds and source URLs, then run `adsb-origin watch`.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use origin_core::config::RegionSettings;
    use origin_core::Snapshot;

    use crate::notification::tests::RecordingSink;

    /// Fails the first poll, then reports two aircraft inside the region.
    #[derive(Default)]
    struct FlakySource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SnapshotSource for FlakySource {
        async fn fetch_snapshot(&self) -> Result<Snapshot> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(WatchError::Status {
                    what: "snapshot".into(),
                    status: reqwest::StatusCode::BAD_GATEWAY,
                });
            }
            Ok(serde_json::from_str(
                r#"{"aircraft": [
                    {"hex": "4ca7b5", "lat": 51.47, "lon": -0.45, "alt_baro": 3250, "r": "EI-DWF"},
                    {"hex": "406b90", "lat": 51.50, "lon": -1.00, "alt_baro": 2000, "r": "G-STBA"}
                ]}"#,
            )?)
        }
    }

    fn watch_region() -> RegionConfig {
        RegionConfig::new(&RegionSettings {
            lat_min: Some(51.0),
            lat_max: Some(52.0),
            lon_min: Some(-1.5),
            lon_max: Some(0.5),
            ..Default::default()
        })
        .unwrap()
    }

    fn pool(sink: Arc<RecordingSink>) -> EnrichPool {
        EnrichPool::start(enrich::tests::enricher(), 2, 4, Duration::from_secs(5), sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_survives_failed_poll_until_idle() {
        let source = FlakySource::default();
        let sink = Arc::new(RecordingSink::default());
        let pool = pool(sink.clone());
        let mut state = TrackingState::new();

        // Polls at 0s (fails), 10s, 20s, 30s, 40s and 50s.
        let exit = run_watch(
            &source,
            &watch_region(),
            &pool,
            &mut state,
            Duration::from_secs(10),
            Duration::from_secs(55),
            std::future::pending(),
        )
        .await;

        assert_eq!(exit, WatchExit::Idle);
        assert_eq!(source.calls.load(Ordering::SeqCst), 6);
        assert_eq!(state.seen_count(), 2);

        pool.drain().await;
        let mut hexes: Vec<String> = sink.alerts.lock().await.iter().map(|a| a.hex.clone()).collect();
        hexes.sort();
        assert_eq!(hexes, vec!["406b90", "4ca7b5"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_stops_on_shutdown() {
        let source = FlakySource::default();
        let pool = pool(Arc::new(RecordingSink::default()));
        let mut state = TrackingState::new();

        let exit = run_watch(
            &source,
            &watch_region(),
            &pool,
            &mut state,
            Duration::from_secs(10),
            Duration::from_secs(3600),
            tokio::time::sleep(Duration::from_secs(25)),
        )
        .await;

        assert_eq!(exit, WatchExit::Interrupted);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        pool.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_stops_when_pool_closed() {
        let source = FlakySource::default();
        let pool = pool(Arc::new(RecordingSink::default()));
        pool.abort();
        while !pool.is_closed() {
            tokio::task::yield_now().await;
        }

        let mut state = TrackingState::new();
        let exit = run_watch(
            &source,
            &watch_region(),
            &pool,
            &mut state,
            Duration::from_secs(10),
            Duration::from_secs(3600),
            std::future::pending(),
        )
        .await;

        assert_eq!(exit, WatchExit::PoolClosed);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.seen_count(), 0);
    }

    #[test]
    fn test_cli_parses_watch_overrides() {
        let cli = Cli::parse_from([
            "adsb-origin",
            "watch",
            "--lat-min",
            "51.0",
            "--lon-min",
            "-1.5",
            "--direction",
            "270",
            "--exclude-type",
            "A388",
            "--exclude-type",
            "B748",
        ]);
        let Commands::Watch { region, .. } = cli.command else {
            panic!("expected watch");
        };
        let mut config = Config::default();
        config.region.lat_max = Some(52.0);
        region.apply(&mut config);

        assert_eq!(config.region.lat_min, Some(51.0));
        assert_eq!(config.region.lat_max, Some(52.0));
        assert_eq!(config.region.lon_min, Some(-1.5));
        assert_eq!(config.region.direction_deg, Some(270.0));
        assert_eq!(config.region.exclude_types, vec!["A388", "B748"]);
    }

    #[test]
    fn test_cli_geocode_negative_lon() {
        let cli = Cli::parse_from(["adsb-origin", "geocode", "51.28", "-0.7775"]);
        match cli.command {
            Commands::Geocode { lat, lon } => {
                assert_eq!(lat, 51.28);
                assert_eq!(lon, -0.7775);
            }
            _ => panic!("expected geocode"),
        }
    }

    #[test]
    fn test_missing_source_is_config_error() {
        let err = required(&None, "sources.aircraft_url", "--aircraft-url").unwrap_err();
        assert!(err.to_string().contains("--aircraft-url"));
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        cmd_init(&Config::default(), Some(path.clone()), false).unwrap();
        assert!(cmd_init(&Config::default(), Some(path.clone()), false).is_err());
        cmd_init(&Config::default(), Some(path.clone()), true).unwrap();
        assert_eq!(config::load_config(Some(&path)).unwrap(), Config::default());
    }

    #[test]
    fn test_build_prefixes_command() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("rows.json");
        let output = dir.path().join("prefixes.json");
        std::fs::write(
            &input,
            r#"{"Malta": {"prefixes_text": "9H", "demonym_raw": "Maltese"}}"#,
        )
        .unwrap();
        cmd_build_prefixes(&input, &output).unwrap();
        let table = PrefixTable::load(&output).unwrap();
        assert_eq!(origin_core::nationality_for("9H-JPC", &table), "Maltese");
    }
}
