use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::errors::AppError;
use crate::reporting::{ChannelTarget, ReportInterval, ReportingConfig, DEFAULT_INTERVAL_SECS};
use crate::shell::DEFAULT_SHELL_TIMEOUT_SECS;

/// Process configuration, read once at startup from the environment
/// (a `.env` file is loaded into it first when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub default_channel: Option<ChannelTarget>,
    pub default_interval: ReportInterval,
    pub command_prefix: String,
    pub shell_timeout: Duration,
    pub disk_path: PathBuf,
    pub status_addr: Option<SocketAddr>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Only a missing token is fatal. Anything else that is malformed is
    /// logged and replaced by its default.
    pub fn from_lookup<F>(get: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let discord_token = get("DISCORD_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AppError::ConfigError(
                    "DISCORD_TOKEN not found in environment variables. \
                     Create a .env file based on .env.example"
                        .into(),
                )
            })?;

        let default_channel = match get("DEFAULT_CHANNEL_ID").map(|v| v.trim().parse::<u64>()) {
            Some(Ok(id)) => ChannelTarget::new(id),
            Some(Err(e)) => {
                warn!(error = %e, "DEFAULT_CHANNEL_ID is not a valid channel id");
                None
            }
            None => None,
        };
        if default_channel.is_none() {
            warn!("DEFAULT_CHANNEL_ID not set. Use the setchannel command to configure.");
        }

        let default_interval = get("DEFAULT_INTERVAL")
            .and_then(|v| match v.trim().parse::<u64>() {
                Ok(secs) => ReportInterval::from_secs(secs).ok(),
                Err(_) => None,
            })
            .unwrap_or_else(|| {
                if get("DEFAULT_INTERVAL").is_some() {
                    warn!(default = DEFAULT_INTERVAL_SECS, "DEFAULT_INTERVAL must be a positive integer");
                }
                ReportInterval::default()
            });
        if !default_interval.is_menu_value() {
            warn!(
                interval_secs = default_interval.secs(),
                "DEFAULT_INTERVAL is not one of the setinterval choices"
            );
        }

        let command_prefix = get("COMMAND_PREFIX")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "!".into());

        let shell_timeout = Duration::from_secs(
            get("SHELL_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_SHELL_TIMEOUT_SECS),
        );

        let disk_path = get("DISK_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/"));

        let status_addr = get("STATUS_ADDR")
            .filter(|a| !a.trim().is_empty())
            .and_then(|addr| match addr.trim().parse::<SocketAddr>() {
                Ok(a) => Some(a),
                Err(e) => {
                    warn!(addr = %addr, error = %e, "STATUS_ADDR is not a socket address, status server disabled");
                    None
                }
            });

        Ok(Self {
            discord_token,
            default_channel,
            default_interval,
            command_prefix,
            shell_timeout,
            disk_path,
            status_addr,
        })
    }

    pub fn reporting(&self) -> ReportingConfig {
        ReportingConfig { target: self.default_channel, interval: self.default_interval }
    }
}
