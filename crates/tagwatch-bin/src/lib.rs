// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # tagwatch-bin
//!
//! Console OPC UA telemetry client.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         main.rs                              │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                    ┌──────▼──────┐
//!                    │    cli.rs   │
//!                    └──────┬──────┘
//!                           │
//!               ┌───────────┼───────────┐
//!               ▼           ▼           ▼
//!        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!        │ commands │ │ runtime  │ │ logging  │
//!        └──────────┘ └────┬─────┘ └──────────┘
//!               │          │
//!               │   ┌──────▼──────┐
//!               │   │  shutdown   │
//!               │   └─────────────┘
//!               │
//!        ┌──────┴──────────────────────────┐
//!        │ tagwatch-config, tagwatch-opcua │
//!        └─────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Stream the tags in ./params.txt (default command)
//! tagwatch
//!
//! # Another parameter file, trusting the server on first contact
//! tagwatch -c /etc/tagwatch/line1.txt run --auto-accept-untrusted
//!
//! # Check a parameter file
//! tagwatch validate --format json
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{RuntimeBuilder, TelemetryRuntime};
pub use shutdown::ShutdownCoordinator;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
