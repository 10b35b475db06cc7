// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use tracing::info;

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::runtime::RuntimeBuilder;

/// Executes the `run` command.
pub async fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    info!(params = %cli.config.display(), "Loading parameters");

    let runtime = RuntimeBuilder::new()
        .params_path(&cli.config)
        .run_args(args)
        .build()?;

    runtime.run().await
}
