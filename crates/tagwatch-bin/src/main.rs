// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! tagwatch - OPC UA telemetry client
//!
//! Main binary entry point.

use tagwatch_bin::{commands, error::report_error_and_exit, init_logging, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    if !matches!(cli.command, Some(Commands::Version)) {
        init_logging(cli.effective_log_level(), cli.log_format);
    }

    if let Err(error) = commands::execute(cli).await {
        report_error_and_exit(error);
    }
}
