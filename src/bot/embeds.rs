use poise::serenity_prelude as serenity;
use serenity::{Colour, CreateEmbed, CreateEmbedFooter, Timestamp};

use crate::metrics::MetricsSnapshot;
use crate::shell::ShellOutcome;

const BLUE: Colour = Colour::new(0x3498DB);
const RED: Colour = Colour::new(0xE74C3C);
const GREEN: Colour = Colour::new(0x2ECC71);
const PURPLE: Colour = Colour::new(0x9B59B6);

fn base(title: &str, description: &str, colour: Colour, footer: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title(title)
        .description(description)
        .colour(colour)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(footer))
}

/// Message shown above a picker.
pub fn prompt(title: &str, description: &str, footer: &str) -> CreateEmbed {
    base(title, description, BLUE, footer)
}

pub fn updated(title: &str, description: &str) -> CreateEmbed {
    base(title, description, BLUE, "Configuration updated")
}

pub fn failure(title: &str, description: &str) -> CreateEmbed {
    base(title, description, RED, "Configuration failed")
}

pub fn channel_info(description: &str) -> CreateEmbed {
    base("Current Logging Channel", description, BLUE, "Channel info")
}

pub fn help(lines: &[String], avatar: Option<String>) -> CreateEmbed {
    let mut embed = base(
        "📚 System Monitor Bot Help",
        "Commands for monitoring and controlling the bot.",
        BLUE,
        "Use help to list commands again.",
    )
    .field("Commands", lines.join("\n"), false);

    if let Some(url) = avatar {
        embed = embed.thumbnail(url);
    }
    embed
}

/// The periodic system stats report.
pub fn report(snapshot: &MetricsSnapshot, avatar: Option<String>) -> CreateEmbed {
    let timestamp = Timestamp::from_unix_timestamp(snapshot.taken_at.timestamp())
        .unwrap_or_else(|_| Timestamp::now());

    let mut embed = CreateEmbed::new()
        .title("🖥️ System Monitor")
        .colour(PURPLE)
        .timestamp(timestamp)
        .footer(CreateEmbedFooter::new("System stats updated"))
        .fields(snapshot.fields().into_iter().map(|f| (f.name, f.value, f.inline)));

    if let Some(url) = avatar {
        embed = embed.thumbnail(url);
    }
    embed
}

pub fn shell_result(outcome: &ShellOutcome) -> CreateEmbed {
    let embed = CreateEmbed::new().title("Shell Command");
    match outcome {
        ShellOutcome::Success { output } => embed
            .colour(GREEN)
            .field("Output", code_block(output), false)
            .footer(CreateEmbedFooter::new("Command executed successfully")),
        ShellOutcome::Failed { output, code } => {
            let footer = match code {
                Some(code) => format!("Command failed (exit code {})", code),
                None => "Command failed".to_string(),
            };
            embed
                .colour(RED)
                .field("Error", code_block(output), false)
                .footer(CreateEmbedFooter::new(footer))
        }
        ShellOutcome::TimedOut { after } => embed
            .colour(RED)
            .field(
                "Error",
                format!("Command timed out after {} seconds.", after.as_secs()),
                false,
            )
            .footer(CreateEmbedFooter::new("Command failed")),
    }
}

pub fn shell_error(message: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title("Shell Command")
        .colour(RED)
        .field("Error", message, false)
        .footer(CreateEmbedFooter::new("Command failed"))
}

fn code_block(text: &str) -> String {
    format!("```\n{}\n```", text)
}
