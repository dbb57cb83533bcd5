//! Configuration for podnic-ctl.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use podnic_common::LogFormat;
use podnic_dataplane::DataplaneSettings;
use serde::Deserialize;

use crate::cli::Args;

/// Location tried when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/podnic/podnic.yaml";

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level or filter directive
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Data plane settings
    pub dataplane: DataplaneSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            dataplane: DataplaneSettings::default(),
        }
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Resolve the configuration for a run.
    ///
    /// An explicit `--config` must load. Otherwise the default location is
    /// used when present and built-in defaults when not.
    pub fn resolve(args: &Args) -> Result<(Self, ConfigSource)> {
        let (config, source) = match &args.config {
            Some(path) => (Self::load(path)?, ConfigSource::File(path.clone())),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => (
                Self::load(DEFAULT_CONFIG_PATH)?,
                ConfigSource::File(PathBuf::from(DEFAULT_CONFIG_PATH)),
            ),
            None => (Self::default(), ConfigSource::Defaults),
        };

        let config = config.with_cli_overrides(args);
        config.validate()?;
        Ok((config, source))
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref level) = args.log_level {
            self.log_level = level.clone();
        }

        if args.json_logs {
            self.log_format = LogFormat::Json;
        }

        if let Some(ref bridge) = args.bridge {
            self.dataplane.integration_bridge = bridge.clone();
        }

        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            anyhow::bail!("log_level must not be empty");
        }
        self.dataplane
            .validate()
            .context("Invalid dataplane configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["podnic-ctl"];
        argv.extend_from_slice(extra);
        argv.push("check");
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "log_format: json\ndataplane:\n  integration_bridge: br-pods\n  ovs_timeout_secs: 5"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.dataplane.integration_bridge, "br-pods");
        assert_eq!(config.dataplane.ovs_timeout_secs, 5);
        assert_eq!(config.dataplane.container_ifname, "eth0");
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/podnic.yaml").unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default().with_cli_overrides(&args(&[
            "--log-level",
            "debug",
            "--json-logs",
            "--bridge",
            "br-test",
        ]));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.dataplane.integration_bridge, "br-test");
    }

    #[test]
    fn test_resolve_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level: warn").unwrap();
        let path = file.path().to_str().unwrap();

        let (config, source) = Config::resolve(&args(&["--config", path])).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(source, ConfigSource::File(file.path().to_path_buf()));
    }

    #[test]
    fn test_resolve_rejects_invalid_dataplane() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dataplane:\n  container_ifname: averyveryverylongname").unwrap();
        let path = file.path().to_str().unwrap();

        assert!(Config::resolve(&args(&["--config", path])).is_err());
    }
}
