// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use std::path::Path;

use tagwatch_config::{load_params, TelemetryConfig};

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};
use crate::runtime::check_node_addresses;

/// Executes the `validate` command.
///
/// Fails on the first node address that does not parse.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config = load_params(&cli.config)?;
    check_node_addresses(&config)?;
    println!("{}", render(&cli.config, &config, args.format)?);
    Ok(())
}

fn render(path: &Path, config: &TelemetryConfig, format: OutputFormat) -> BinResult<String> {
    match format {
        OutputFormat::Text => {
            let mut out = format!("✓ Parameter file is valid: {}\n\n", path.display());
            out.push_str("Summary:\n");
            out.push_str(&format!("  Server: {}\n", config.discovery_url()));
            out.push_str(&format!("  Tags:   {}\n", config.tags.len()));
            for tag in &config.tags {
                out.push_str(&format!("    {} -> {}\n", tag.name, tag.node_address));
            }
            Ok(out.trim_end().to_string())
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "params_path": path.display().to_string(),
                "discovery_url": config.discovery_url(),
                "config": config,
            });
            serde_json::to_string_pretty(&output)
                .map_err(|e| BinError::runtime(format!("Failed to serialize summary: {}", e)))
        }
    }
}
