pub mod commands;
pub mod embeds;
pub mod sink;

use std::sync::Arc;

use poise::serenity_prelude as serenity;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::errors::AppError;
use crate::metrics::SystemMetrics;
use crate::reporting::{ReportingController, ReportingState};
use crate::shell::ShellRunner;

use sink::DiscordSink;

/// Shared with every command invocation.
pub struct Data {
    pub reporting: ReportingState,
    pub shell: ShellRunner,
}

pub type Context<'a> = poise::Context<'a, Data, AppError>;

/// Build the Discord client. The reporting loop starts once, the first
/// time the gateway reports ready.
pub async fn client(
    config: &Config,
    reporting: ReportingState,
    shell: ShellRunner,
    metrics: Arc<SystemMetrics>,
    shutdown: broadcast::Sender<()>,
) -> Result<serenity::Client, AppError> {
    let options = poise::FrameworkOptions {
        commands: commands::all(),
        prefix_options: poise::PrefixFrameworkOptions {
            prefix: Some(config.command_prefix.clone()),
            ..Default::default()
        },
        on_error: |error| Box::pin(on_error(error)),
        pre_command: |ctx| {
            Box::pin(async move {
                debug!(
                    command = %ctx.command().qualified_name,
                    author = %ctx.author().name,
                    "Command invoked"
                );
            })
        },
        ..Default::default()
    };

    let framework = poise::Framework::builder()
        .options(options)
        .setup(move |ctx, ready, _framework| {
            Box::pin(async move {
                info!(user = %ready.user.name, guilds = ready.guilds.len(), "Logged in to Discord");

                let sink = Arc::new(DiscordSink::new(ctx.clone()));
                ReportingController::new(reporting.clone(), metrics, sink).spawn(shutdown.subscribe());

                Ok(Data { reporting, shell })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::MESSAGE_CONTENT;

    let client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await?;
    Ok(client)
}

async fn on_error(error: poise::FrameworkError<'_, Data, AppError>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!(error = %error, "Failed to start the bot");
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            warn!(command = %ctx.command().qualified_name, error = %error, "Command failed");
            let reply = poise::CreateReply::default()
                .embed(embeds::failure("Command Failed", &error.to_string()))
                .ephemeral(true);
            if let Err(e) = ctx.send(reply).await {
                warn!(error = %e, "Failed to report command error");
            }
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                warn!(error = %e, "Error while handling error");
            }
        }
    }
}
