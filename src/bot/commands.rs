use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Todos los comandos slash del bot
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        search_command(),
        pick_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
        autonowplaying_command(),
        repeat_command(),
        shuffle_command(),
        clear_command(),
        remove_command(),
        move_command(),
        help_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o la agrega a la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

fn search_command() -> CreateCommand {
    CreateCommand::new("search")
        .description("Busca en YouTube y muestra los mejores resultados")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "Término de búsqueda")
                .required(true),
        )
}

fn pick_command() -> CreateCommand {
    CreateCommand::new("pick")
        .description("Agrega un resultado de tu última búsqueda")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "number", "Número del resultado")
                .min_int_value(1)
                .max_int_value(5)
                .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción, limpia la cola y sale del canal")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra la canción actual con su progreso")
}

fn autonowplaying_command() -> CreateCommand {
    CreateCommand::new("autonowplaying")
        .description("Publica automáticamente cada canción nueva en este canal")
}

fn repeat_command() -> CreateCommand {
    CreateCommand::new("repeat")
        .description("Configura el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .add_string_choice("Desactivar", "off")
                .add_string_choice("Canción", "track")
                .add_string_choice("Cola", "queue")
                .required(true),
        )
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla las canciones de la cola")
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Limpia la cola sin detener la canción actual")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita una canción de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición en la cola")
                .min_int_value(1)
                .required(true),
        )
}

fn move_command() -> CreateCommand {
    CreateCommand::new("move")
        .description("Mueve una canción a otra posición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "from", "Posición actual")
                .min_int_value(1)
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "to", "Nueva posición")
                .min_int_value(1)
                .required(true),
        )
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Muestra información de ayuda")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_set() {
        let names: Vec<String> = all_commands()
            .iter()
            .filter_map(|command| {
                serde_json::to_value(command)
                    .ok()
                    .and_then(|value| value["name"].as_str().map(str::to_string))
            })
            .collect();

        assert_eq!(
            names,
            [
                "play",
                "search",
                "pick",
                "skip",
                "stop",
                "queue",
                "nowplaying",
                "autonowplaying",
                "repeat",
                "shuffle",
                "clear",
                "remove",
                "move",
                "help"
            ]
        );
    }
}
