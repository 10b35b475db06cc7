// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Parameter file loading.
//!
//! # Format
//!
//! ```text
//! endpoint:10.0.0.5
//! port:4840
//! Temp:ns=2;s=Line1.Temp
//! Speed:ns=2;i=1042
//! ```
//!
//! Each line is split on its first colon, so node addresses may contain
//! colons. `endpoint` and `port` are reserved; every other name is a tag.
//! Blank lines are skipped. Any other line without a colon fails the load,
//! so a mistyped tag never leaves the client running with a partial tag set.
//!
//! `endpoint` holds a host name, an IPv4 address or an IPv6 literal
//! (optionally bracketed). The port goes on its own `port` line.

use std::collections::HashMap;
use std::fs;
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};

/// Reserved key for the server host.
pub const ENDPOINT_KEY: &str = "endpoint";

/// Reserved key for the server port.
pub const PORT_KEY: &str = "port";

/// Port used when the file has no `port` line.
pub const DEFAULT_PORT: u16 = 4840;

const URL_SCHEME: &str = "opc.tcp://";

// =============================================================================
// TelemetryConfig
// =============================================================================

/// One tag to monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    /// Display name.
    pub name: String,
    /// Node address, e.g. `ns=2;s=Line1.Temp`.
    pub node_address: String,
}

/// Contents of a parameter file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Server host.
    pub server_host: String,
    /// Server port.
    pub server_port: u16,
    /// Tags in file order.
    pub tags: Vec<TagEntry>,
}

impl TelemetryConfig {
    /// Returns the discovery URL `opc.tcp://host:port`.
    pub fn discovery_url(&self) -> String {
        if self.server_host.contains(':') {
            format!("{}[{}]:{}", URL_SCHEME, self.server_host, self.server_port)
        } else {
            format!("{}{}:{}", URL_SCHEME, self.server_host, self.server_port)
        }
    }

    /// Looks up a tag by name.
    pub fn tag(&self, name: &str) -> Option<&TagEntry> {
        self.tags.iter().find(|t| t.name == name)
    }
}

// =============================================================================
// ParamsLoader
// =============================================================================

/// Parameter file loader.
///
/// # Examples
///
/// ```no_run
/// use tagwatch_config::loader::ParamsLoader;
///
/// let config = ParamsLoader::new().load("params.txt").unwrap();
/// println!("{} tags on {}", config.tags.len(), config.discovery_url());
/// ```
#[derive(Debug, Clone)]
pub struct ParamsLoader {
    default_port: u16,
    require_tags: bool,
}

impl ParamsLoader {
    /// Creates a loader with default settings.
    pub fn new() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            require_tags: true,
        }
    }

    /// Sets the port used when the file has none.
    pub fn default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Sets whether a file without tags is an error.
    pub fn require_tags(mut self, require: bool) -> Self {
        self.require_tags = require;
        self
    }

    /// Loads and parses a parameter file.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<TelemetryConfig> {
        let path = path.as_ref();
        info!("Loading parameters from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;

        let config = self.parse(&content, path)?;
        debug!(
            host = %config.server_host,
            port = config.server_port,
            tags = config.tags.len(),
            "Parameters loaded"
        );
        Ok(config)
    }

    /// Parses parameter file content. `source` names the content in errors.
    pub fn parse(&self, content: &str, source: impl AsRef<Path>) -> ConfigResult<TelemetryConfig> {
        let path: PathBuf = source.as_ref().to_path_buf();

        let mut host: Option<(String, usize)> = None;
        let mut port: Option<(u16, usize)> = None;
        let mut tags: Vec<TagEntry> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (index, raw) in content.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(ConfigError::parse(
                    &path,
                    line_no,
                    format!("expected 'name:value', got '{}'", line),
                ));
            };
            let name = name.trim();
            let value = value.trim();

            if name.is_empty() {
                return Err(ConfigError::validation(&path, Some(line_no), "empty name"));
            }
            if let Some(first_line) = seen.insert(name.to_string(), line_no) {
                return Err(ConfigError::duplicate_key(&path, line_no, first_line, name));
            }

            match name {
                ENDPOINT_KEY => {
                    let value = value.strip_prefix(URL_SCHEME).unwrap_or(value).trim();
                    let host_name = parse_host(value).map_err(|reason| {
                        ConfigError::invalid_value(&path, line_no, ENDPOINT_KEY, reason)
                    })?;
                    host = Some((host_name, line_no));
                }
                PORT_KEY => {
                    let parsed = value
                        .parse::<u16>()
                        .ok()
                        .filter(|p| *p > 0)
                        .ok_or_else(|| {
                            ConfigError::invalid_value(
                                &path,
                                line_no,
                                PORT_KEY,
                                format!("'{}' is not a port number in 1..=65535", value),
                            )
                        })?;
                    port = Some((parsed, line_no));
                }
                _ => {
                    if value.is_empty() {
                        return Err(ConfigError::validation(
                            &path,
                            Some(line_no),
                            format!("tag '{}' has an empty node address", name),
                        ));
                    }
                    tags.push(TagEntry {
                        name: name.to_string(),
                        node_address: value.to_string(),
                    });
                }
            }
        }

        let (server_host, _) = host.ok_or_else(|| ConfigError::missing_field(&path, ENDPOINT_KEY))?;
        let server_port = port.map(|(p, _)| p).unwrap_or(self.default_port);

        if self.require_tags && tags.is_empty() {
            return Err(ConfigError::validation(&path, None, "no tags defined"));
        }

        Ok(TelemetryConfig {
            server_host,
            server_port,
            tags,
        })
    }
}

/// Validates an `endpoint` value. IPv6 literals are returned without brackets.
fn parse_host(value: &str) -> Result<String, String> {
    if value.is_empty() {
        return Err("host is empty".to_string());
    }
    if value.contains(char::is_whitespace) || value.contains('/') {
        return Err(format!("'{}' is not a host name", value));
    }
    if !value.contains(':') {
        return Ok(value.to_string());
    }

    let literal = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value);
    literal
        .parse::<Ipv6Addr>()
        .map(|_| literal.to_string())
        .map_err(|_| {
            format!(
                "'{}' is neither a host name nor an IPv6 address; put the port on a 'port' line",
                value
            )
        })
}

impl Default for ParamsLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads a parameter file with default settings.
pub fn load_params(path: impl AsRef<Path>) -> ConfigResult<TelemetryConfig> {
    ParamsLoader::new().load(path)
}

/// Parses parameter file content with default settings.
pub fn parse_params(content: &str, source: impl AsRef<Path>) -> ConfigResult<TelemetryConfig> {
    ParamsLoader::new().parse(content, source)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "\
endpoint:10.0.0.5
port:4841

L1:ns=2;s=A
L2 : ns=2;s=B
";

    #[test]
    fn test_parse_tags_in_order() {
        let config = parse_params(SAMPLE, "params.txt").unwrap();
        assert_eq!(config.server_host, "10.0.0.5");
        assert_eq!(config.server_port, 4841);
        assert_eq!(
            config.tags,
            vec![
                TagEntry {
                    name: "L1".into(),
                    node_address: "ns=2;s=A".into()
                },
                TagEntry {
                    name: "L2".into(),
                    node_address: "ns=2;s=B".into()
                },
            ]
        );
        assert_eq!(config.discovery_url(), "opc.tcp://10.0.0.5:4841");
    }

    #[test]
    fn test_split_on_first_colon() {
        let config = parse_params(
            "endpoint:opc.tcp://plc01\nUrlTag:ns=3;s=http://vendor/x:y",
            "p",
        )
        .unwrap();
        assert_eq!(config.server_host, "plc01");
        assert_eq!(config.server_port, DEFAULT_PORT);
        assert_eq!(config.tag("UrlTag").unwrap().node_address, "ns=3;s=http://vendor/x:y");
    }

    #[test]
    fn test_line_without_colon() {
        let error = parse_params("endpoint:h\nbogus line\nT:ns=2;i=1", "params.txt").unwrap_err();
        assert!(matches!(error, ConfigError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_hash_line_is_not_a_comment() {
        let error = parse_params("endpoint:h\nTemp:ns=2;s=T1\n#Level ns=2;s=L1\n", "p").unwrap_err();
        assert!(matches!(error, ConfigError::Parse { line: 3, .. }));
    }

    #[test]
    fn test_duplicates() {
        let error = parse_params("endpoint:h\nT:ns=2;i=1\nT:ns=2;i=2", "p").unwrap_err();
        assert!(matches!(
            error,
            ConfigError::DuplicateKey {
                line: 3,
                first_line: 2,
                ..
            }
        ));

        let error = parse_params("endpoint:h\nendpoint:g\nT:ns=2;i=1", "p").unwrap_err();
        assert!(matches!(error, ConfigError::DuplicateKey { .. }));
    }

    #[test]
    fn test_missing_endpoint_and_bad_port() {
        let error = parse_params("T:ns=2;i=1", "p").unwrap_err();
        assert!(matches!(error, ConfigError::MissingField { ref field, .. } if field == "endpoint"));

        for port in ["0", "70000", "abc"] {
            let content = format!("endpoint:h\nport:{}\nT:ns=2;i=1", port);
            let error = parse_params(&content, "p").unwrap_err();
            assert!(matches!(error, ConfigError::InvalidValue { line: 2, .. }));
        }
    }

    #[test]
    fn test_empty_values_and_no_tags() {
        let error = parse_params("endpoint:h\nT:", "p").unwrap_err();
        assert!(matches!(error, ConfigError::Validation { line: Some(2), .. }));

        let error = parse_params("endpoint:h\n:ns=2;i=1", "p").unwrap_err();
        assert!(matches!(error, ConfigError::Validation { .. }));

        let error = parse_params("endpoint:h", "p").unwrap_err();
        assert!(matches!(error, ConfigError::Validation { line: None, .. }));

        let config = ParamsLoader::new()
            .require_tags(false)
            .default_port(4850)
            .parse("endpoint:h", "p")
            .unwrap();
        assert!(config.tags.is_empty());
        assert_eq!(config.server_port, 4850);
    }

    #[test]
    fn test_ipv6_discovery_url() {
        let config = parse_params("endpoint:fe80::1\nT:ns=2;i=1", "p").unwrap();
        assert_eq!(config.discovery_url(), "opc.tcp://[fe80::1]:4840");

        let config = parse_params("endpoint:[::1]\nport:4841\nT:ns=2;i=1", "p").unwrap();
        assert_eq!(config.server_host, "::1");
        assert_eq!(config.discovery_url(), "opc.tcp://[::1]:4841");
    }

    #[test]
    fn test_endpoint_with_port_is_rejected() {
        for endpoint in ["10.0.0.5:4841", "opc.tcp://plc01:4840", "plc 01", "plc01/path"] {
            let content = format!("endpoint:{}\nT:ns=2;i=1", endpoint);
            let error = parse_params(&content, "p").unwrap_err();
            assert!(
                matches!(error, ConfigError::InvalidValue { line: 1, ref field, .. } if field == "endpoint"),
                "{} was accepted",
                endpoint
            );
        }
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_params(file.path()).unwrap();
        assert_eq!(config.tags.len(), 2);
    }

    #[test]
    fn test_file_not_found() {
        let result = load_params("/nonexistent/path/params.txt");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }
}
