use std::time::Duration;

use poise::serenity_prelude as serenity;
use poise::CreateReply;
use serenity::Mentionable;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bot::sink::can_send;
use crate::bot::{embeds, Context, Data};
use crate::errors::AppError;
use crate::reporting::{ChannelTarget, ReportInterval, ALLOWED_INTERVALS};

/// Pickers stop listening after this long.
const PICKER_TIMEOUT: Duration = Duration::from_secs(60);
/// Discord caps select menus at 25 options.
const MAX_SELECT_OPTIONS: usize = 25;

pub fn all() -> Vec<poise::Command<Data, AppError>> {
    vec![setchannel(), setinterval(), getchannel(), run(), help()]
}

/// Change logging channel
#[poise::command(prefix_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn setchannel(ctx: Context<'_>) -> Result<(), AppError> {
    let guild_id = ctx
        .guild_id()
        .ok_or_else(|| AppError::InvalidRequest("this command only works in a server".into()))?;
    let me = ctx.cache().current_user().id;

    let mut channels: Vec<serenity::GuildChannel> = guild_id
        .channels(ctx.serenity_context())
        .await?
        .into_values()
        .filter(|c| c.kind == serenity::ChannelType::Text)
        .filter(|c| can_send(ctx.cache(), c, me))
        .collect();
    channels.sort_by_key(|c| c.position);
    channels.truncate(MAX_SELECT_OPTIONS);

    if channels.is_empty() {
        let embed = embeds::failure(
            "Error: Set Logging Channel",
            "I can't send messages in any text channel of this server.",
        );
        ctx.send(CreateReply::default().embed(embed).ephemeral(true)).await?;
        return Ok(());
    }

    let custom_id = format!("setchannel-{}", Uuid::new_v4());
    let options = channels
        .iter()
        .map(|c| serenity::CreateSelectMenuOption::new(c.name.clone(), c.id.to_string()))
        .collect();
    let menu = serenity::CreateSelectMenu::new(&custom_id, serenity::CreateSelectMenuKind::String { options })
        .placeholder("Select a channel for logging...")
        .min_values(1)
        .max_values(1);

    ctx.send(
        CreateReply::default()
            .embed(embeds::prompt(
                "Select Logging Channel",
                "Choose a channel from the dropdown below.",
                "Select within 60 seconds",
            ))
            .components(vec![serenity::CreateActionRow::SelectMenu(menu)]),
    )
    .await?;

    let Some(interaction) = await_component(ctx, custom_id).await else {
        debug!("Channel picker expired");
        return Ok(());
    };

    let reply = match selected_value(&interaction) {
        Some(value) => apply_channel_choice(ctx, value).await,
        None => serenity::CreateInteractionResponseMessage::new()
            .embed(embeds::failure("Error: Set Logging Channel", "Selected channel not found."))
            .ephemeral(true),
    };

    interaction
        .create_response(ctx.serenity_context(), serenity::CreateInteractionResponse::Message(reply))
        .await?;
    Ok(())
}

/// Re-check the picked channel, then make it the report target.
async fn apply_channel_choice(ctx: Context<'_>, value: &str) -> serenity::CreateInteractionResponseMessage {
    const TITLE: &str = "Error: Set Logging Channel";

    let Some(target) = value.parse::<u64>().ok().and_then(ChannelTarget::new) else {
        return failure_response(TITLE, "Selected channel not found.");
    };

    let channel = match serenity::ChannelId::new(target.get())
        .to_channel(ctx.serenity_context())
        .await
        .ok()
        .and_then(|c| c.guild())
    {
        Some(channel) => channel,
        None => return failure_response(TITLE, "Selected channel not found."),
    };

    let me = ctx.cache().current_user().id;
    if !can_send(ctx.cache(), &channel, me) {
        let description = format!(
            "I don't have permission to send messages in {}.",
            channel.id.mention()
        );
        return failure_response(TITLE, &description);
    }

    ctx.data().reporting.set_channel(target);
    info!(channel = %channel.name, channel_id = %target, "Logging channel updated");

    serenity::CreateInteractionResponseMessage::new().embed(embeds::updated(
        "Set Logging Channel",
        &format!("System stats will now be logged to {}.", channel.id.mention()),
    ))
}

/// Change logging interval
#[poise::command(prefix_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn setinterval(ctx: Context<'_>) -> Result<(), AppError> {
    let custom_id = format!("setinterval-{}", Uuid::new_v4());
    let options = ALLOWED_INTERVALS
        .iter()
        .map(|secs| serenity::CreateSelectMenuOption::new(format!("{} seconds", secs), secs.to_string()))
        .collect();
    let menu = serenity::CreateSelectMenu::new(&custom_id, serenity::CreateSelectMenuKind::String { options })
        .placeholder("Select logging interval...")
        .min_values(1)
        .max_values(1);

    ctx.send(
        CreateReply::default()
            .embed(embeds::prompt(
                "Select Logging Interval",
                "Choose an interval from the dropdown below.",
                "Select within 60 seconds",
            ))
            .components(vec![serenity::CreateActionRow::SelectMenu(menu)]),
    )
    .await?;

    let Some(interaction) = await_component(ctx, custom_id).await else {
        debug!("Interval picker expired");
        return Ok(());
    };

    let interval = selected_value(&interaction).and_then(parse_interval_choice);
    let reply = match interval {
        Some(interval) => {
            ctx.data().reporting.set_interval(interval);
            info!(interval_secs = interval.secs(), "Logging interval updated");
            serenity::CreateInteractionResponseMessage::new().embed(embeds::updated(
                "Set Logging Interval",
                &format!("Logging interval set to {} seconds.", interval.secs()),
            ))
        }
        None => failure_response("Error: Set Logging Interval", "Selected interval is not valid."),
    };

    interaction
        .create_response(ctx.serenity_context(), serenity::CreateInteractionResponse::Message(reply))
        .await?;
    Ok(())
}

/// Show current logging channel
#[poise::command(prefix_command)]
pub async fn getchannel(ctx: Context<'_>) -> Result<(), AppError> {
    let custom_id = format!("getchannel-{}", Uuid::new_v4());
    let button = serenity::CreateButton::new(&custom_id)
        .label("Show Current Channel")
        .style(serenity::ButtonStyle::Primary);

    ctx.send(
        CreateReply::default()
            .embed(embeds::prompt(
                "Current Logging Channel",
                "Click the button to view the current logging channel.",
                "Click within 60 seconds",
            ))
            .components(vec![serenity::CreateActionRow::Buttons(vec![button])]),
    )
    .await?;

    let Some(interaction) = await_component(ctx, custom_id).await else {
        debug!("Channel button expired");
        return Ok(());
    };

    let description = match ctx.data().reporting.channel() {
        None => "No logging channel configured.".to_string(),
        Some(target) => {
            let resolved = serenity::ChannelId::new(target.get())
                .to_channel(ctx.serenity_context())
                .await
                .is_ok();
            describe_channel(target, resolved)
        }
    };

    let reply = serenity::CreateInteractionResponseMessage::new()
        .embed(embeds::channel_info(&description))
        .ephemeral(true);
    interaction
        .create_response(ctx.serenity_context(), serenity::CreateInteractionResponse::Message(reply))
        .await?;
    Ok(())
}

/// Run a shell command
#[poise::command(prefix_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn run(
    ctx: Context<'_>,
    #[rest]
    #[description = "Shell command to execute"]
    command: String,
) -> Result<(), AppError> {
    info!(author = %ctx.author().name, author_id = %ctx.author().id, "Shell command requested");

    let embed = match ctx.data().shell.run(&command).await {
        Ok(outcome) => {
            debug!(success = outcome.is_success(), "Replying with shell result");
            embeds::shell_result(&outcome)
        }
        Err(e) => {
            warn!(error = %e, "Shell command could not be run");
            embeds::shell_error(&e.to_string())
        }
    };

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// List available commands
#[poise::command(prefix_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), AppError> {
    let prefix = ctx.prefix();
    let lines: Vec<String> = ctx
        .framework()
        .options()
        .commands
        .iter()
        .filter(|c| !c.hide_in_help)
        .map(|c| {
            format!(
                "`{}{}`: {}",
                prefix,
                c.name,
                c.description.as_deref().unwrap_or("No description")
            )
        })
        .collect();
    let avatar = ctx.cache().current_user().avatar_url();

    ctx.send(CreateReply::default().embed(embeds::help(&lines, avatar))).await?;
    Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Wait for the invoking user to use the component with `custom_id`.
async fn await_component(ctx: Context<'_>, custom_id: String) -> Option<serenity::ComponentInteraction> {
    serenity::ComponentInteractionCollector::new(ctx.serenity_context())
        .author_id(ctx.author().id)
        .channel_id(ctx.channel_id())
        .timeout(PICKER_TIMEOUT)
        .filter(move |mci| mci.data.custom_id == custom_id)
        .next()
        .await
}

fn selected_value(interaction: &serenity::ComponentInteraction) -> Option<&str> {
    match &interaction.data.kind {
        serenity::ComponentInteractionDataKind::StringSelect { values } => {
            values.first().map(String::as_str)
        }
        _ => None,
    }
}

fn failure_response(title: &str, description: &str) -> serenity::CreateInteractionResponseMessage {
    serenity::CreateInteractionResponseMessage::new()
        .embed(embeds::failure(title, description))
        .ephemeral(true)
}

/// Only picker values are accepted.
fn parse_interval_choice(value: &str) -> Option<ReportInterval> {
    value
        .parse::<u64>()
        .ok()
        .and_then(|secs| ReportInterval::from_secs(secs).ok())
        .filter(|interval| interval.is_menu_value())
}

fn describe_channel(target: ChannelTarget, resolved: bool) -> String {
    if resolved {
        format!("Logging to: <#{}>", target)
    } else {
        format!("Logging to: Unknown channel (ID: {})", target)
    }
}
