//! # propctl
//!
//! Command-line host for [`propform`] forms.
//!
//! propctl opens the form described by `.propctl.toml`, loads its schemas
//! from a directory and its stored data from the last submission, and drives
//! the validate → submit workflow from the shell. Submissions are written as
//! JSON files; dependent lookups are answered from a static table.
//!
//! ## Modules
//!
//! - [`config`] - The `.propctl.toml` configuration
//! - [`ctx`] - Application context
//! - [`form`] - Form commands and their text output
//! - [`services`] - File-backed persistence and table lookups
//! - [`utils`] - Placeholder expansion and argument parsing
//!
//! ## Example
//!
//! ```text
//! propctl show
//! propctl --set Book/title=Dune submit
//! propctl --attach Review validate --format json
//! ```

#![cfg(not(target_os = "none"))]

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

/// Configuration file.
pub mod config;

/// Application context and service wiring.
pub mod ctx;

/// Form commands.
pub mod form;

/// File-backed services.
pub mod services;

/// Common utilities and helper functions.
pub mod utils;
