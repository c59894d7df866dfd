use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How shop seat capacity is judged against the overlapping reservations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CapacityRule {
    /// Unavailable once the number of overlapping reservations reaches the seat count.
    #[default]
    OverlapCount,
    /// Unavailable once the peak number of simultaneous overlapping reservations
    /// inside the candidate reaches the seat count.
    PeakOccupancy,
}

impl FromStr for CapacityRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overlap-count" | "overlap_count" | "count" => Ok(CapacityRule::OverlapCount),
            "peak-occupancy" | "peak_occupancy" | "peak" => Ok(CapacityRule::PeakOccupancy),
            other => Err(format!("unknown capacity rule: {other}")),
        }
    }
}

/// Knobs read by the reservation engine on every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Longest wait for a shop/stylist day lock before failing with a retryable conflict.
    pub lock_timeout: Duration,
    /// Booking grid in minutes. Menu durations must be a multiple of it.
    pub slot_minutes: u32,
    pub capacity_rule: CapacityRule,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            slot_minutes: 30,
            capacity_rule: CapacityRule::OverlapCount,
        }
    }
}

/// Process-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub engine: EngineConfig,
    pub data_dir: PathBuf,
    /// Journal appends after which the compactor rewrites the journal.
    pub compact_threshold: u64,
    pub lock_prune_interval: Duration,
    pub metrics_port: Option<u16>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            lock_prune_interval: Duration::from_secs(60),
            metrics_port: None,
        }
    }
}

impl Settings {
    /// Read `SALONBOOK_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values fall back to the default for that key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("ignoring unparseable {key}={raw:?}");
                    None
                }
            }
        }

        let defaults = Settings::default();
        let engine = EngineConfig {
            lock_timeout: parsed(&lookup, "SALONBOOK_LOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.engine.lock_timeout),
            slot_minutes: parsed(&lookup, "SALONBOOK_SLOT_MINUTES")
                .filter(|m: &u32| *m > 0)
                .unwrap_or(defaults.engine.slot_minutes),
            capacity_rule: parsed(&lookup, "SALONBOOK_CAPACITY_RULE")
                .unwrap_or(defaults.engine.capacity_rule),
        };

        Self {
            engine,
            data_dir: lookup("SALONBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            compact_threshold: parsed(&lookup, "SALONBOOK_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            lock_prune_interval: parsed(&lookup, "SALONBOOK_LOCK_PRUNE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lock_prune_interval),
            metrics_port: parsed(&lookup, "SALONBOOK_METRICS_PORT"),
        }
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("salonbook.wal")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let settings = Settings::from_lookup(lookup(&[]));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.engine.slot_minutes, 30);
        assert_eq!(settings.engine.lock_timeout, Duration::from_secs(5));
        assert_eq!(settings.journal_path(), PathBuf::from("./data/salonbook.wal"));
    }

    #[test]
    fn overrides_are_applied() {
        let settings = Settings::from_lookup(lookup(&[
            ("SALONBOOK_LOCK_TIMEOUT_MS", "250"),
            ("SALONBOOK_SLOT_MINUTES", "15"),
            ("SALONBOOK_CAPACITY_RULE", "peak"),
            ("SALONBOOK_DATA_DIR", "/var/lib/salonbook"),
            ("SALONBOOK_COMPACT_THRESHOLD", "50"),
            ("SALONBOOK_METRICS_PORT", "9100"),
        ]));
        assert_eq!(settings.engine.lock_timeout, Duration::from_millis(250));
        assert_eq!(settings.engine.slot_minutes, 15);
        assert_eq!(settings.engine.capacity_rule, CapacityRule::PeakOccupancy);
        assert_eq!(settings.data_dir, PathBuf::from("/var/lib/salonbook"));
        assert_eq!(settings.compact_threshold, 50);
        assert_eq!(settings.metrics_port, Some(9100));
    }

    #[test]
    fn bad_values_fall_back_to_defaults() {
        let settings = Settings::from_lookup(lookup(&[
            ("SALONBOOK_LOCK_TIMEOUT_MS", "soon"),
            ("SALONBOOK_SLOT_MINUTES", "0"),
            ("SALONBOOK_CAPACITY_RULE", "whatever"),
        ]));
        assert_eq!(settings.engine, EngineConfig::default());
    }
}
