//! Configuration file management for adsb-origin.
//!
//! Reads/writes `~/.adsb-origin/config.yaml` with the watched region, data
//! source URLs, worker settings, and webhook URL.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::types::{OriginError, Result};

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub region: RegionSettings,
    pub sources: SourceConfig,
    pub watch: WatchConfig,
    pub webhook: Option<String>,
}

/// Region values as written in the file; validated into a [`RegionConfig`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionSettings {
    pub lat_min: Option<f64>,
    pub lat_max: Option<f64>,
    pub lon_min: Option<f64>,
    pub lon_max: Option<f64>,
    pub max_height_ft: Option<f64>,
    pub direction_deg: Option<f64>,
    pub exclude_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub aircraft_url: Option<String>,
    pub trace_base_url: Option<String>,
    pub overpass_url: String,
    pub prefixes_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    pub poll_interval_sec: u64,
    pub workers: usize,
    pub queue_capacity: usize,
    pub request_timeout_sec: u64,
    pub idle_timeout_hours: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            region: RegionSettings::default(),
            sources: SourceConfig {
                aircraft_url: None,
                trace_base_url: None,
                overpass_url: DEFAULT_OVERPASS_URL.into(),
                prefixes_path: None,
            },
            watch: WatchConfig {
                poll_interval_sec: 30,
                workers: 4,
                queue_capacity: 64,
                request_timeout_sec: 10,
                idle_timeout_hours: 8.0,
            },
            webhook: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Validated region
// ---------------------------------------------------------------------------

/// The region of interest. Set once at startup, read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionConfig {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
    pub max_height_ft: Option<f64>,
    pub direction_deg: Option<f64>,
    pub exclude_types: BTreeSet<String>,
}

impl RegionConfig {
    pub fn new(settings: &RegionSettings) -> Result<Self> {
        let require = |v: Option<f64>, name: &str| {
            v.ok_or_else(|| OriginError::Config(format!("region.{name} is required")))
        };
        let lat_min = require(settings.lat_min, "lat_min")?;
        let lat_max = require(settings.lat_max, "lat_max")?;
        let lon_min = require(settings.lon_min, "lon_min")?;
        let lon_max = require(settings.lon_max, "lon_max")?;

        if lat_min >= lat_max {
            return Err(OriginError::Config(format!(
                "region.lat_min ({lat_min}) must be below region.lat_max ({lat_max})"
            )));
        }
        if lon_min >= lon_max {
            return Err(OriginError::Config(format!(
                "region.lon_min ({lon_min}) must be below region.lon_max ({lon_max})"
            )));
        }
        if let Some(dir) = settings.direction_deg {
            if !(0.0..360.0).contains(&dir) {
                return Err(OriginError::Config(format!(
                    "region.direction_deg ({dir}) must lie in [0, 360)"
                )));
            }
        }

        Ok(RegionConfig {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
            max_height_ft: settings.max_height_ft,
            direction_deg: settings.direction_deg,
            exclude_types: settings.exclude_types.iter().cloned().collect(),
        })
    }

    /// Strict bounding-box test: a point on the boundary is outside.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat > self.lat_min && lat < self.lat_max && lon > self.lon_min && lon < self.lon_max
    }
}

// ---------------------------------------------------------------------------
// File locations
// ---------------------------------------------------------------------------

/// Get the config directory path (`~/.adsb-origin/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".adsb-origin")
}

/// Get the default config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `path`, or from `~/.adsb-origin/config.yaml` when `None`.
///
/// A missing file yields the default config; an unreadable one is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_file);
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(&path)?;
    parse_config(&text)
}

/// Save config to `path`, creating parent directories as needed.
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serialize_config(config))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Parse / serialize
// ---------------------------------------------------------------------------

/// Parse simple YAML-like config text.
pub fn parse_config(text: &str) -> Result<Config> {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for (lineno, line) in text.lines().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            return Err(OriginError::Config(format!(
                "line {}: expected `key: value`",
                lineno + 1
            )));
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            if val.is_empty() {
                current_section = Some(key.to_string());
            } else {
                current_section = None;
                if key == "webhook" {
                    config.webhook = parse_string_value(val);
                }
            }
            continue;
        }

        let Some(section) = current_section.as_deref() else {
            continue;
        };
        let bad = |what: &str| {
            OriginError::Config(format!("line {}: invalid {what} for {section}.{key}", lineno + 1))
        };

        match section {
            "region" => {
                let region = &mut config.region;
                match key {
                    "lat_min" => region.lat_min = parse_float_value(val).map_err(|_| bad("number"))?,
                    "lat_max" => region.lat_max = parse_float_value(val).map_err(|_| bad("number"))?,
                    "lon_min" => region.lon_min = parse_float_value(val).map_err(|_| bad("number"))?,
                    "lon_max" => region.lon_max = parse_float_value(val).map_err(|_| bad("number"))?,
                    "max_height_ft" => {
                        region.max_height_ft = parse_float_value(val).map_err(|_| bad("number"))?
                    }
                    "direction_deg" => {
                        region.direction_deg = parse_float_value(val).map_err(|_| bad("number"))?
                    }
                    "exclude_types" => region.exclude_types = parse_list_value(val),
                    _ => {}
                }
            }
            "sources" => match key {
                "aircraft_url" => config.sources.aircraft_url = parse_string_value(val),
                "trace_base_url" => config.sources.trace_base_url = parse_string_value(val),
                "overpass_url" => {
                    if let Some(v) = parse_string_value(val) {
                        config.sources.overpass_url = v;
                    }
                }
                "prefixes_path" => config.sources.prefixes_path = parse_string_value(val),
                _ => {}
            },
            "watch" => {
                let watch = &mut config.watch;
                match key {
                    "poll_interval_sec" => {
                        watch.poll_interval_sec = val.parse().map_err(|_| bad("integer"))?
                    }
                    "workers" => watch.workers = val.parse().map_err(|_| bad("integer"))?,
                    "queue_capacity" => {
                        watch.queue_capacity = val.parse().map_err(|_| bad("integer"))?
                    }
                    "request_timeout_sec" => {
                        watch.request_timeout_sec = val.parse().map_err(|_| bad("integer"))?
                    }
                    "idle_timeout_hours" => {
                        watch.idle_timeout_hours = val.parse().map_err(|_| bad("number"))?
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    Ok(config)
}

fn is_null(val: &str) -> bool {
    val == "null" || val == "~" || val.is_empty()
}

fn parse_string_value(val: &str) -> Option<String> {
    if is_null(val) {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> std::result::Result<Option<f64>, std::num::ParseFloatError> {
    if is_null(val) {
        return Ok(None);
    }
    val.parse().map(Some)
}

fn parse_list_value(val: &str) -> Vec<String> {
    parse_string_value(val)
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn opt_line(key: &str, val: Option<f64>) -> String {
    match val {
        Some(v) => format!("  {key}: {v}"),
        None => format!("  {key}: null"),
    }
}

fn opt_str_line(key: &str, val: Option<&str>) -> String {
    match val {
        Some(v) => format!("  {key}: \"{v}\""),
        None => format!("  {key}: null"),
    }
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let mut lines = vec!["# adsb-origin configuration".to_string(), String::new()];

    let region = &config.region;
    lines.push("region:".into());
    lines.push(opt_line("lat_min", region.lat_min));
    lines.push(opt_line("lat_max", region.lat_max));
    lines.push(opt_line("lon_min", region.lon_min));
    lines.push(opt_line("lon_max", region.lon_max));
    lines.push(opt_line("max_height_ft", region.max_height_ft));
    lines.push(opt_line("direction_deg", region.direction_deg));
    if region.exclude_types.is_empty() {
        lines.push("  exclude_types: null".into());
    } else {
        lines.push(format!("  exclude_types: \"{}\"", region.exclude_types.join(",")));
    }
    lines.push(String::new());

    let sources = &config.sources;
    lines.push("sources:".into());
    lines.push(opt_str_line("aircraft_url", sources.aircraft_url.as_deref()));
    lines.push(opt_str_line("trace_base_url", sources.trace_base_url.as_deref()));
    lines.push(format!("  overpass_url: \"{}\"", sources.overpass_url));
    lines.push(opt_str_line("prefixes_path", sources.prefixes_path.as_deref()));
    lines.push(String::new());

    let watch = &config.watch;
    lines.push("watch:".into());
    lines.push(format!("  poll_interval_sec: {}", watch.poll_interval_sec));
    lines.push(format!("  workers: {}", watch.workers));
    lines.push(format!("  queue_capacity: {}", watch.queue_capacity));
    lines.push(format!("  request_timeout_sec: {}", watch.request_timeout_sec));
    lines.push(format!("  idle_timeout_hours: {}", watch.idle_timeout_hours));
    lines.push(String::new());

    match &config.webhook {
        Some(url) => lines.push(format!("webhook: \"{url}\"")),
        None => lines.push("webhook: null".into()),
    }

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
