//! Core domain logic for the screen-time tracker.
//!
//! This crate contains the pure parts of time attribution:
//! - Domain extraction: mapping a URL to the host that receives its time
//! - Aggregates: lifetime records and per-day buckets, plus their wire format
//! - Retention: which daily buckets have expired
//! - Summaries: headline totals and per-period domain views

pub mod aggregate;
mod config;
pub mod domain;
pub mod retention;
pub mod summary;
pub mod types;

pub use aggregate::{
    Aggregates, DAILY_DATA_KEY, DailyBucket, DailyData, LifetimeRecord, TIME_DATA_KEY, TimeData,
    date_of,
};
pub use config::{DEFAULT_ICON_TEMPLATE, EngineConfig};
pub use domain::extract;
pub use summary::{DomainUsage, Period, Summary, format_duration, period_usage, summarize};
pub use types::{Domain, TabId, ValidationError, WindowId};
