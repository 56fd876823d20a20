//! Service configuration
//!
//! Each setting resolves as: command-line argument → environment variable →
//! TOML file → built-in default. Clap covers the first two tiers; the TOML
//! file fills whatever is still unset.

use anyhow::bail;
use clap::Parser;
use eidafed_common::config::TomlConfig;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ROUTING_URL: &str = "http://www.orfeus-eu.org/eidaws/routing/1/query";
pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_LEG_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_MAX_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Command-line arguments for eidafed-fd
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "eidafed-fd")]
#[command(about = "Federated FDSN station and dataselect service")]
#[command(version)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "EIDAFED_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "EIDAFED_PORT")]
    pub port: Option<u16>,

    /// TOML configuration file
    #[arg(short, long, env = "EIDAFED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Routing (discovery) service endpoint
    #[arg(long, env = "EIDAFED_ROUTING_URL")]
    pub routing_url: Option<String>,

    /// Concurrent backend legs per session
    #[arg(long, env = "EIDAFED_WORKERS")]
    pub workers: Option<usize>,

    /// Per-leg timeout in milliseconds
    #[arg(long, env = "EIDAFED_LEG_TIMEOUT_MS")]
    pub leg_timeout_ms: Option<u64>,

    /// Additional attempts after a failed leg (0 or 1)
    #[arg(long, env = "EIDAFED_LEG_RETRIES")]
    pub leg_retries: Option<u32>,

    /// Delay before a retry in milliseconds
    #[arg(long, env = "EIDAFED_RETRY_BACKOFF_MS")]
    pub retry_backoff_ms: Option<u64>,

    /// Longest time window requested from one backend leg, in days
    #[arg(long, env = "EIDAFED_MAX_WINDOW_DAYS")]
    pub max_window_days: Option<i64>,

    /// Keep different start years of one network in separate legs
    #[arg(long, env = "EIDAFED_BUNDLE_BY_YEAR")]
    pub bundle_by_year: Option<bool>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "EIDAFED_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Operational log file (JSON lines)
    #[arg(long, env = "EIDAFED_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

/// Fan-out and merge tuning shared by every session
#[derive(Debug, Clone, PartialEq)]
pub struct FederationConfig {
    pub workers: usize,
    pub leg_timeout: Duration,
    pub leg_retries: u32,
    pub retry_backoff: Duration,
    pub max_window: chrono::Duration,
    pub bundle_by_year: bool,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            leg_timeout: Duration::from_millis(DEFAULT_LEG_TIMEOUT_MS),
            leg_retries: 0,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            max_window: chrono::Duration::days(DEFAULT_MAX_WINDOW_DAYS),
            bundle_by_year: false,
        }
    }
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct FederatorConfig {
    pub host: String,
    pub port: u16,
    pub routing_url: String,
    pub federation: FederationConfig,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl FederatorConfig {
    /// Merge arguments over a loaded TOML file and validate the result
    pub fn resolve(args: Args, file: TomlConfig) -> anyhow::Result<Self> {
        let fed = file.federation;

        let workers = args.workers.or(fed.workers).unwrap_or(DEFAULT_WORKERS);
        let leg_timeout_ms = args
            .leg_timeout_ms
            .or(fed.leg_timeout_ms)
            .unwrap_or(DEFAULT_LEG_TIMEOUT_MS);
        let leg_retries = args.leg_retries.or(fed.leg_retries).unwrap_or(0);
        let retry_backoff_ms = args
            .retry_backoff_ms
            .or(fed.retry_backoff_ms)
            .unwrap_or(DEFAULT_RETRY_BACKOFF_MS);
        let max_window_days = args
            .max_window_days
            .or(fed.max_window_days)
            .unwrap_or(DEFAULT_MAX_WINDOW_DAYS);

        if workers == 0 {
            bail!("workers must be greater than 0");
        }
        if leg_timeout_ms == 0 {
            bail!("leg timeout must be greater than 0");
        }
        if leg_retries > 1 {
            bail!("leg retries ({}) must be 0 or 1", leg_retries);
        }
        if max_window_days <= 0 {
            bail!("max window ({} days) must be greater than 0", max_window_days);
        }

        let routing_url = args
            .routing_url
            .or(file.routing_url)
            .unwrap_or_else(|| DEFAULT_ROUTING_URL.to_string());
        url::Url::parse(&routing_url)
            .map_err(|e| anyhow::anyhow!("Invalid routing URL {}: {}", routing_url, e))?;

        Ok(Self {
            host: args.host.or(file.host).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            routing_url,
            federation: FederationConfig {
                workers,
                leg_timeout: Duration::from_millis(leg_timeout_ms),
                leg_retries,
                retry_backoff: Duration::from_millis(retry_backoff_ms),
                max_window: chrono::Duration::days(max_window_days),
                bundle_by_year: args
                    .bundle_by_year
                    .or(fed.bundle_by_year)
                    .unwrap_or(false),
            },
            log_level: args
                .log_level
                .or(file.logging.level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_file: args.log_file.or(file.logging.file),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl TryFrom<Args> for FederatorConfig {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let file = TomlConfig::load_or_default(args.config.as_deref())?;
        Self::resolve(args, file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eidafed_common::config::FederationSettings;

    #[test]
    fn test_defaults_without_any_source() {
        let config = FederatorConfig::resolve(Args::default(), TomlConfig::default()).unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.routing_url, DEFAULT_ROUTING_URL);
        assert_eq!(config.federation, FederationConfig::default());
        assert_eq!(config.log_level, "info");
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_arguments_override_file() {
        let file = TomlConfig {
            port: Some(9000),
            host: Some("0.0.0.0".into()),
            federation: FederationSettings {
                workers: Some(4),
                leg_timeout_ms: Some(500),
                ..Default::default()
            },
            ..Default::default()
        };
        let args = Args {
            port: Some(9100),
            workers: Some(2),
            ..Default::default()
        };

        let config = FederatorConfig::resolve(args, file).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.federation.workers, 2);
        assert_eq!(config.federation.leg_timeout, Duration::from_millis(500));
        assert_eq!(config.listen_addr(), "0.0.0.0:9100");
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let cases = [
            Args { workers: Some(0), ..Default::default() },
            Args { leg_timeout_ms: Some(0), ..Default::default() },
            Args { leg_retries: Some(2), ..Default::default() },
            Args { max_window_days: Some(0), ..Default::default() },
            Args { routing_url: Some("not a url".into()), ..Default::default() },
        ];
        for args in cases {
            assert!(
                FederatorConfig::resolve(args.clone(), TomlConfig::default()).is_err(),
                "expected rejection for {:?}",
                args
            );
        }
    }

    #[test]
    fn test_cli_parses_long_flags() {
        let args = Args::parse_from([
            "eidafed-fd",
            "--port",
            "8181",
            "--leg-retries",
            "1",
            "--bundle-by-year",
            "true",
        ]);
        assert_eq!(args.port, Some(8181));
        assert_eq!(args.leg_retries, Some(1));
        assert_eq!(args.bundle_by_year, Some(true));
    }
}
