// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # tagwatch-config
//!
//! Parameter file loading for the tagwatch OPC UA telemetry client.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tagwatch_config::load_params;
//!
//! let config = load_params("params.txt").unwrap();
//! for tag in &config.tags {
//!     println!("{} -> {}", tag.name, tag.node_address);
//! }
//! ```
//!
//! ## Parameter File
//!
//! ```text
//! endpoint:10.0.0.5
//! port:4840
//! Temp:ns=2;s=Line1.Temp
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    load_params, parse_params, ParamsLoader, TagEntry, TelemetryConfig, DEFAULT_PORT,
    ENDPOINT_KEY, PORT_KEY,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
