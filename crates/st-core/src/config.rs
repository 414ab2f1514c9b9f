//! Engine tuning knobs.

use std::time::Duration;

/// Default icon reference template. `{domain}` is replaced by the domain.
pub const DEFAULT_ICON_TEMPLATE: &str = "https://www.google.com/s2/favicons?domain={domain}&sz=64";

/// Configuration for the attribution engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Cadence of the periodic flush. Bounds the unsaved time at risk if the
    /// process dies. Default: 10 seconds.
    pub flush_interval: Duration,

    /// Cadence of the retention sweep. Default: 24 hours.
    pub sweep_interval: Duration,

    /// Daily buckets dated this many days before today (or earlier) are
    /// deleted. Default: 30.
    pub retention_days: u32,

    /// Template used to derive a domain's icon reference.
    pub icon_template: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(24 * 60 * 60),
            retention_days: 30,
            icon_template: DEFAULT_ICON_TEMPLATE.to_string(),
        }
    }
}
