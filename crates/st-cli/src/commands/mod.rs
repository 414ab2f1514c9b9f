//! CLI subcommand implementations.

pub mod export;
pub mod replay;
pub mod report;
pub mod reset;
pub mod run;
pub mod status;
pub mod sweep;
