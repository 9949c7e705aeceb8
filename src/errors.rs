use poise::serenity_prelude as serenity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Discord error: {0}")]
    Discord(#[from] serenity::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Shell error: {0}")]
    ShellError(String),
}
