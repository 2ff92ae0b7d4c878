//! # Bot Module
//!
//! Discord surface of the jukebox: slash-command registration and dispatch,
//! search sessions for `/search` + `/pick`, plus voice state tracking.
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`] and only talks to
//! the [`PlaybackEngine`] through its command methods; it never touches queue
//! state directly.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod search;

use crate::{audio::PlaybackEngine, config::Config, sources::Resolver, ui::DiscordPresenter};

/// Main Discord event handler.
pub struct JukeboxBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    pub engine: Arc<PlaybackEngine>,
    pub resolver: Arc<dyn Resolver>,
    pub presenter: DiscordPresenter,
    /// Resultados de `/search` pendientes de `/pick`
    pub searches: search::SearchSessions,
}

impl JukeboxBot {
    pub fn new(
        config: Config,
        engine: Arc<PlaybackEngine>,
        resolver: Arc<dyn Resolver>,
        presenter: DiscordPresenter,
    ) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            resolver,
            presenter,
            searches: search::SearchSessions::default(),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Per guild when `GUILD_ID` is configured (propagates in about a
    /// second), globally otherwise (can take up to an hour).
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                // Verificar que el bot esté en la guild
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Tears the guild down when Discord disconnects the bot from voice.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };
        let was_in_voice = old.as_ref().and_then(|state| state.channel_id).is_some();
        // Tras /stop el engine ya no espera estar conectado
        if was_in_voice && self.engine.voice_channel(guild_id).is_some() {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.engine.teardown(guild_id).await;
        }
    }
}
