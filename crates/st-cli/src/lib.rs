//! Screen-time tracker CLI library.
//!
//! This crate provides the `st` command-line interface: a host harness that
//! drives the attribution engine from event feeds and reads back its data.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::Config;
