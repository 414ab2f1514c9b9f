//! Time-attribution engine for the screen-time tracker.
//!
//! Host events flow through the [`Tracker`], which owns the single active
//! [`Session`] and flushes elapsed time into the [`AggregateStore`] through a
//! [`StoreSink`]. The [`Engine`] runs the tracker in one task alongside the
//! periodic flush and retention sweep timers; the [`Facade`] serves reads,
//! resets and exports.
//!
//! [`AggregateStore`]: st_store::AggregateStore

mod engine;
pub mod event;
mod facade;
pub mod host;
mod router;
pub mod session;
mod sink;
pub mod sweeper;

pub use engine::{Engine, EngineError, EngineHandle};
pub use event::{FeedRecord, FocusEvent};
pub use facade::{ExportDocument, ExportSummary, Facade, Request, Response, export_file_name};
pub use host::{HostBrowser, HostError, Tab, TabRegistry};
pub use router::Tracker;
pub use session::{Contribution, FlushError, Session, SessionError, Sink};
pub use sink::StoreSink;
