use anyhow::Result;
use futures::StreamExt;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info};

use crate::{
    audio::{
        engine::{PlayRequest, StopSummary},
        queue::RepeatMode,
    },
    bot::JukeboxBot,
    error::{MusicError, MusicResult},
    ui::embeds,
};

/// Respuesta a un comando slash
struct Reply {
    embed: CreateEmbed,
    ephemeral: bool,
}

impl Reply {
    fn public(embed: CreateEmbed) -> Self {
        Self {
            embed,
            ephemeral: false,
        }
    }

    fn ephemeral(embed: CreateEmbed) -> Self {
        Self {
            embed,
            ephemeral: true,
        }
    }

    fn error(error: &MusicError) -> Self {
        Self::ephemeral(embeds::create_music_error_embed(error))
    }

    fn into_response(self) -> CreateInteractionResponse {
        CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .embed(self.embed)
                .ephemeral(self.ephemeral),
        )
    }
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => return handle_play(ctx, &command, guild_id, bot).await,
        "search" => return handle_search(ctx, &command, guild_id, bot).await,
        "pick" => return handle_pick(ctx, &command, guild_id, bot).await,
        "nowplaying" => return handle_nowplaying(ctx, command, guild_id, bot).await,
        _ => {}
    }

    let engine = &bot.engine;
    let reply = match command.data.name.as_str() {
        "skip" => engine.skip(guild_id).await.map(|track| {
            Reply::public(embeds::create_success_embed(
                "Canción saltada",
                &format!("⏭️ **{}**", track.title()),
            ))
        }),
        "stop" => engine
            .stop(guild_id)
            .await
            .map(|summary| Reply::public(embeds::create_success_embed("Reproducción detenida", &describe_stop(summary)))),
        "queue" => {
            let page = option_usize(&command, "page").unwrap_or(1);
            Ok(Reply::public(embeds::create_queue_embed(
                &engine.queue_snapshot(guild_id),
                page,
            )))
        }
        "autonowplaying" => {
            let enabled = engine.toggle_auto_display(guild_id, command.channel_id);
            let description = if enabled {
                format!("📺 Las canciones nuevas se publicarán en <#{}>", command.channel_id)
            } else {
                "📺 Publicación automática desactivada".to_string()
            };
            Ok(Reply::public(embeds::create_info_embed("Now playing automático", &description)))
        }
        "repeat" => handle_repeat(&command, guild_id, bot),
        "shuffle" => engine.shuffle(guild_id).map(|()| {
            Reply::public(embeds::create_success_embed("Cola mezclada", "🔀 La cola se mezcló"))
        }),
        "clear" => {
            let cleared = engine.clear(guild_id);
            Ok(Reply::public(embeds::create_success_embed(
                "Cola limpiada",
                &format!("🗑️ Se quitaron {} canciones", cleared),
            )))
        }
        "remove" => {
            let position = option_usize(&command, "position").unwrap_or(0);
            engine.remove(guild_id, position).map(|track| {
                Reply::public(embeds::create_success_embed(
                    "Canción quitada",
                    &format!("❌ **{}** (posición {})", track.title(), position),
                ))
            })
        }
        "move" => {
            let from = option_usize(&command, "from").unwrap_or(0);
            let to = option_usize(&command, "to").unwrap_or(0);
            engine.move_track(guild_id, from, to).map(|track| {
                Reply::public(embeds::create_success_embed(
                    "Canción movida",
                    &format!("↕️ **{}** ahora está en la posición {}", track.title(), to),
                ))
            })
        }
        "help" => Ok(Reply::ephemeral(embeds::create_help_embed())),
        _ => Ok(Reply::ephemeral(embeds::create_error_embed(
            "Comando no reconocido",
            "Usa `/help` para ver todos los comandos disponibles",
        ))),
    };

    let reply = reply.unwrap_or_else(|e| {
        debug!("Comando /{} rechazado en guild {}: {}", command.data.name, guild_id, e);
        Reply::error(&e)
    });
    command.create_response(&ctx.http, reply.into_response()).await?;

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(ctx: &Context, command: &CommandInteraction, guild_id: GuildId, bot: &JukeboxBot) -> Result<()> {
    let query = option_str(command, "query").unwrap_or_default().to_string();

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let request = PlayRequest {
        voice_channel: get_user_voice_channel(ctx, guild_id, command.user.id),
        text_channel: Some(command.channel_id),
        query,
    };

    let embed = match bot
        .engine
        .play_query(guild_id, request, bot.resolver.as_ref())
        .await
    {
        Ok(outcome) => embeds::create_track_added_embed(&outcome),
        Err(e) => embeds::create_music_error_embed(&e),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_search(ctx: &Context, command: &CommandInteraction, guild_id: GuildId, bot: &JukeboxBot) -> Result<()> {
    let query = option_str(command, "query").unwrap_or_default().to_string();

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = match bot
        .searches
        .search(guild_id, command.user.id, &query, bot.resolver.as_ref())
        .await
    {
        Ok(results) => embeds::create_search_results_embed(&query, &results),
        Err(e) => embeds::create_music_error_embed(&e),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_pick(ctx: &Context, command: &CommandInteraction, guild_id: GuildId, bot: &JukeboxBot) -> Result<()> {
    let choice = option_usize(command, "number").unwrap_or(0);
    let track = match bot.searches.pick(guild_id, command.user.id, choice) {
        Ok(track) => track,
        Err(e) => {
            command
                .create_response(&ctx.http, Reply::error(&e).into_response())
                .await?;
            return Ok(());
        }
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let voice_channel = get_user_voice_channel(ctx, guild_id, command.user.id);
    let embed = match bot
        .engine
        .play_track(guild_id, voice_channel, Some(command.channel_id), track)
        .await
    {
        Ok(outcome) => embeds::create_track_added_embed(&outcome),
        Err(e) => embeds::create_music_error_embed(&e),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_nowplaying(ctx: &Context, command: CommandInteraction, guild_id: GuildId, bot: &JukeboxBot) -> Result<()> {
    let Some(snapshot) = bot.engine.now_playing_snapshot(guild_id) else {
        command
            .create_response(&ctx.http, Reply::error(&MusicError::NothingPlaying).into_response())
            .await?;
        return Ok(());
    };

    let embed = embeds::create_now_playing_embed(&snapshot, bot.presenter.repeat_mode(guild_id));
    command
        .create_response(&ctx.http, Reply::public(embed).into_response())
        .await?;

    // Actualizar el mensaje mientras dure el track (o el token de la interacción)
    let mut updates = Box::pin(bot.presenter.live_embeds(guild_id, snapshot.generation));
    let http = ctx.http.clone();
    tokio::spawn(async move {
        while let Some(embed) = updates.next().await {
            if let Err(e) = command
                .edit_response(&http, EditInteractionResponse::new().embed(embed))
                .await
            {
                debug!("✏️ /nowplaying ya no se puede editar en guild {}: {:?}", guild_id, e);
                break;
            }
        }
    });

    Ok(())
}

fn handle_repeat(command: &CommandInteraction, guild_id: GuildId, bot: &JukeboxBot) -> MusicResult<Reply> {
    let mode = match option_str(command, "mode").unwrap_or("off").parse::<RepeatMode>() {
        Ok(mode) => mode,
        Err(e) => {
            return Ok(Reply::ephemeral(embeds::create_error_embed("Repetición", &e)));
        }
    };

    let previous = bot.engine.set_repeat_mode(guild_id, mode);
    let message = match mode {
        RepeatMode::Track => "🔂 Repetir canción activado",
        RepeatMode::Queue => "🔁 Repetir cola activado",
        RepeatMode::Off => "➡️ Repetición desactivada",
    };
    debug!("Repetición en guild {}: {} → {}", guild_id, previous, mode);

    Ok(Reply::public(embeds::create_success_embed("Repetición", message)))
}

// Funciones auxiliares

fn describe_stop(summary: StopSummary) -> String {
    match (summary.was_playing, summary.cleared) {
        (false, 0) => "⏹️ No había nada reproduciéndose".to_string(),
        (_, 0) => "⏹️ Reproducción detenida".to_string(),
        (_, cleared) => format!("⏹️ Reproducción detenida y {} canciones quitadas de la cola", cleared),
    }
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_usize(command: &CommandInteraction, name: &str) -> Option<usize> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
        .and_then(|value| usize::try_from(value).ok())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_describe_stop() {
        assert_eq!(
            describe_stop(StopSummary::default()),
            "⏹️ No había nada reproduciéndose"
        );
        assert_eq!(
            describe_stop(StopSummary {
                cleared: 0,
                was_playing: true
            }),
            "⏹️ Reproducción detenida"
        );
        assert_eq!(
            describe_stop(StopSummary {
                cleared: 3,
                was_playing: true
            }),
            "⏹️ Reproducción detenida y 3 canciones quitadas de la cola"
        );
    }
}
