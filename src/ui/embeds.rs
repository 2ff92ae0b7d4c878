use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{
        engine::PlayOutcome,
        now_playing::NowPlayingSnapshot,
        queue::{QueuePage, QueueSnapshot, RepeatMode},
        track::TrackRef,
    },
    error::MusicError,
};

/// Canciones por página en `/queue`
pub const QUEUE_PAGE_SIZE: usize = 10;

const PROGRESS_BAR_CELLS: usize = 20;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

/// Crea un embed para mostrar la canción actual con su progreso
pub fn create_now_playing_embed(snapshot: &NowPlayingSnapshot, repeat_mode: RepeatMode) -> CreateEmbed {
    let track = &snapshot.track;
    let progress = if snapshot.total.is_zero() {
        format!("{}\n`{}`", progress_bar(snapshot.elapsed, snapshot.total, PROGRESS_BAR_CELLS), format_duration(snapshot.elapsed))
    } else {
        format!(
            "{}\n`{} / {}`",
            progress_bar(snapshot.elapsed, snapshot.total, PROGRESS_BAR_CELLS),
            format_duration(snapshot.elapsed),
            format_duration(snapshot.total)
        )
    };

    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**\n\n{}", track.title(), progress))
        .color(colors::SUCCESS_GREEN)
        .field(
            "⏱️ Duración",
            if snapshot.total.is_zero() {
                "🔴 En vivo".to_string()
            } else {
                format_duration(snapshot.total)
            },
            true,
        )
        .field(
            format!("{} Repetición", repeat_mode.emoji()),
            repeat_mode.label(),
            true,
        );

    if track.locator().starts_with("http") {
        embed = embed.url(track.locator());
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(outcome: &PlayOutcome) -> CreateEmbed {
    let track = &outcome.track;
    let (title, description) = match outcome.position {
        Some(position) => (
            "✅ Canción Agregada",
            format!("**{}** se agregó en la posición **{}**", track.title(), position),
        ),
        None => (
            "🎵 Reproduciendo",
            format!("**{}** empieza a sonar", track.title()),
        ),
    };

    let duration = if track.duration_secs() == 0 {
        "🔴 En vivo".to_string()
    } else {
        format_duration(track.duration())
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration, true);

    if track.locator().starts_with("http") {
        embed = embed.url(track.locator());
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente si no hay música sonando",
        ))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &QueueSnapshot, page: usize) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.is_idle() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let queue_page = snapshot.page(page, QUEUE_PAGE_SIZE);
    let mut embed = embed;

    // Canción actual
    if let Some(current) = &snapshot.now_playing {
        let status = match snapshot.repeat_mode {
            RepeatMode::Off => "▶️",
            mode => mode.emoji(),
        };
        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!("**{}**", current.title()),
            false,
        );
    }

    // Próximas canciones
    if !queue_page.entries.is_empty() {
        embed = embed.field("Próximas canciones", queue_listing(&queue_page), false);
    }

    // Información adicional
    let mut info = format!("**Total:** {} canciones", queue_page.total_items);
    if snapshot.total_duration > Duration::ZERO {
        info.push_str(&format!(
            " • **Duración:** {}",
            format_duration(snapshot.total_duration)
        ));
    }
    info.push_str(&format!(
        " • {} **{}**",
        snapshot.repeat_mode.emoji(),
        snapshot.repeat_mode.label()
    ));
    embed = embed.field("Información", info, false);

    // Paginación
    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Guild Jukebox",
            queue_page.current_page, queue_page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

/// Aviso de que la cola terminó
pub fn create_queue_finished_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("📭 Cola terminada")
        .description("No quedan canciones. Usa `/play <canción>` para seguir escuchando")
        .color(colors::NEUTRAL_GRAY)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea embed con resultados de búsqueda
pub fn create_search_results_embed(query: &str, results: &[TrackRef]) -> CreateEmbed {
    CreateEmbed::default()
        .title("🔍 Resultados de Búsqueda")
        .description(format!(
            "Búsqueda: **{}**\nElige una con `/pick <número>`",
            query
        ))
        .field("Canciones Encontradas", search_listing(results), false)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de ayuda general
pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Guild Jukebox - Comandos")
        .color(colors::INFO_BLUE)
        .description("Una cola de música por servidor")
        .field(
            "🎵 Reproducción",
            "• `/play <canción>` - Reproduce o agrega a la cola\n\
            • `/search <búsqueda>` - Muestra los 5 mejores resultados\n\
            • `/pick <número>` - Agrega un resultado de la última búsqueda\n\
            • `/skip` - Salta la canción actual\n\
            • `/stop` - Detiene, limpia la cola y sale del canal\n\
            • `/nowplaying` - Muestra la canción actual",
            false,
        )
        .field(
            "📜 Cola",
            "• `/queue [página]` - Muestra la cola\n\
            • `/shuffle` - Mezcla la cola\n\
            • `/repeat <off|track|queue>` - Configura repetición\n\
            • `/remove <posición>` - Quita una canción\n\
            • `/move <desde> <hasta>` - Mueve una canción\n\
            • `/clear` - Limpia la cola",
            false,
        )
        .field(
            "📺 Pantalla",
            "• `/autonowplaying` - Publica cada canción nueva en este canal",
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed de error para un [`MusicError`]
pub fn create_music_error_embed(error: &MusicError) -> CreateEmbed {
    let title = match error {
        MusicError::NotInVoiceContext | MusicError::ConnectFailed(_) => "Canal de voz",
        MusicError::ResolutionFailed { .. } => "Sin resultados",
        MusicError::StreamStartFailed { .. }
        | MusicError::StreamInterrupted { .. }
        | MusicError::PlaybackHalted { .. } => "Error de reproducción",
        MusicError::Cancelled => "Cancelado",
        MusicError::NoPendingSearch => "Búsqueda",
        _ => "Cola",
    };

    let embed = create_error_embed(title, &error.to_string());
    match error {
        MusicError::Cancelled => embed.color(colors::WARNING_ORANGE),
        _ => embed,
    }
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn queue_listing(page: &QueuePage) -> String {
    page.entries
        .iter()
        .map(|(position, track)| {
            let duration = if track.duration_secs() > 0 {
                format!(" `[{}]`", format_duration(track.duration()))
            } else {
                String::new()
            };
            format!("**{}**. {}{}\n", position, track.title(), duration)
        })
        .collect()
}

/// Barra de `cells` segmentos con un marcador en la posición reproducida.
///
/// Without a known duration the marker is left out.
pub fn progress_bar(elapsed: Duration, total: Duration, cells: usize) -> String {
    if total.is_zero() || cells == 0 {
        return "▬".repeat(cells);
    }

    let ratio = (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0);
    let last = cells - 1;
    let marker = ((ratio * last as f64).round() as usize).min(last);

    (0..cells)
        .map(|cell| if cell == marker { "🔵" } else { "▬" })
        .collect()
}

fn search_listing(results: &[TrackRef]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, track)| match track.duration_secs() {
            0 => format!("**{}**. {}\n", i + 1, track.title()),
            _ => format!("**{}**. {} `[{}]`\n", i + 1, track.title(), format_duration(track.duration())),
        })
        .collect()
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0:00");
        assert_eq!(format_duration(Duration::from_secs(185)), "3:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_progress_bar_marker() {
        let total = Duration::from_secs(200);

        let start = progress_bar(Duration::ZERO, total, 20);
        assert!(start.starts_with("🔵"));
        assert_eq!(start.chars().count(), 20);

        let end = progress_bar(total, total, 20);
        assert!(end.ends_with("🔵"));

        let middle = progress_bar(Duration::from_secs(100), total, 21);
        assert_eq!(middle, format!("{}🔵{}", "▬".repeat(10), "▬".repeat(10)));
    }

    #[test]
    fn test_progress_bar_without_duration() {
        let bar = progress_bar(Duration::from_secs(30), Duration::ZERO, 20);
        assert_eq!(bar, "▬".repeat(20));
    }

    #[test]
    fn test_queue_listing_numbers_from_page() {
        let snapshot = QueueSnapshot {
            now_playing: None,
            items: (1..=12)
                .map(|i| TrackRef::new(format!("loc{i}"), format!("T{i}"), if i == 12 { 0 } else { 65 }))
                .collect(),
            repeat_mode: RepeatMode::Off,
            total_duration: Duration::from_secs(65 * 11),
        };

        let listing = queue_listing(&snapshot.page(2, QUEUE_PAGE_SIZE));
        assert_eq!(listing, "**11**. T11 `[1:05]`\n**12**. T12\n");
    }

    #[test]
    fn test_search_listing_numbers_results() {
        let results = vec![
            TrackRef::new("loc1", "Xuân Về", 200),
            TrackRef::new("loc2", "Tết Đến", 0),
        ];
        assert_eq!(
            search_listing(&results),
            "**1**. Xuân Về `[3:20]`\n**2**. Tết Đến\n"
        );
    }
}
