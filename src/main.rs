use anyhow::Result;
use guild_jukebox::{
    audio::{now_playing::NowPlayingTracker, voice::SongbirdTransport, GuildQueueStore, PlaybackEngine},
    bot::JukeboxBot,
    config::Config,
    sources::YtDlpResolver,
    ui::DiscordPresenter,
};
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config.ytdlp_path).await;
    }

    info!("{}", config.summary());

    // Estado compartido y colaboradores del engine
    let store = GuildQueueStore::new(config.queue_limit());
    let tracker = NowPlayingTracker::new(store.clone(), config.now_playing_interval);
    let http = Arc::new(Http::new(&config.discord_token));
    let presenter = DiscordPresenter::new(http, store.clone(), tracker);

    let songbird = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(songbird.clone(), config.default_volume)?);
    let engine = PlaybackEngine::new(
        store,
        transport,
        Arc::new(presenter.clone()),
        config.engine_options(),
    );
    let resolver = Arc::new(YtDlpResolver::new(
        config.ytdlp_path.clone(),
        config.resolver_concurrency,
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Crear handler del bot
    let handler = JukeboxBot::new(config.clone(), engine, resolver, presenter);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Error al registrar Ctrl+C: {:?}", e),
        }
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(ytdlp_path: &str) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
