use async_trait::async_trait;
use poise::serenity_prelude as serenity;

use crate::bot::embeds;
use crate::metrics::MetricsSnapshot;
use crate::reporting::{ChannelTarget, DeliveryError, ReportSink};

/// Delivers reports to guild text channels through the live gateway session.
pub struct DiscordSink {
    ctx: serenity::Context,
}

impl DiscordSink {
    pub fn new(ctx: serenity::Context) -> Self {
        Self { ctx }
    }
}

pub struct ResolvedChannel {
    target: ChannelTarget,
    channel: serenity::GuildChannel,
}

#[async_trait]
impl ReportSink for DiscordSink {
    type Destination = ResolvedChannel;

    async fn resolve(&self, target: ChannelTarget) -> Result<ResolvedChannel, DeliveryError> {
        let channel = serenity::ChannelId::new(target.get())
            .to_channel(&self.ctx)
            .await
            .map_err(|e| DeliveryError::Unresolved { channel: target, reason: e.to_string() })?;

        match channel.guild() {
            Some(channel) => Ok(ResolvedChannel { target, channel }),
            None => Err(DeliveryError::Unresolved {
                channel: target,
                reason: "not a server text channel".into(),
            }),
        }
    }

    async fn ensure_can_send(&self, destination: &ResolvedChannel) -> Result<(), DeliveryError> {
        let me = self.ctx.cache.current_user().id;
        if can_send(&self.ctx.cache, &destination.channel, me) {
            Ok(())
        } else {
            Err(DeliveryError::NoPermission {
                channel: destination.target,
                name: destination.channel.name.clone(),
            })
        }
    }

    async fn send(
        &self,
        destination: &ResolvedChannel,
        snapshot: &MetricsSnapshot,
    ) -> Result<(), DeliveryError> {
        let avatar = self.ctx.cache.current_user().avatar_url();
        let message = serenity::CreateMessage::new().embed(embeds::report(snapshot, avatar));
        let (channel, name) = (destination.target, destination.channel.name.clone());

        match destination.channel.send_message(&self.ctx, message).await {
            Ok(_) => Ok(()),
            Err(e) if is_forbidden(&e) => Err(DeliveryError::Forbidden { channel, name }),
            Err(e) => Err(DeliveryError::Transport { channel, name, reason: e.to_string() }),
        }
    }
}

/// Whether `user` may post in `channel`, judged from the cached guild.
/// An uncached guild or member counts as no.
pub fn can_send(cache: &serenity::Cache, channel: &serenity::GuildChannel, user: serenity::UserId) -> bool {
    let Some(guild) = channel.guild(cache) else {
        return false;
    };
    match guild.members.get(&user) {
        Some(member) => guild.user_permissions_in(channel, member).send_messages(),
        None => false,
    }
}

fn is_forbidden(err: &serenity::Error) -> bool {
    match err {
        serenity::Error::Http(e) => e.status_code().map(|s| s.as_u16()) == Some(403),
        _ => false,
    }
}
