use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{ResolveError, Resolver};
use crate::audio::track::TrackRef;

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.|m\.|music\.)?(youtube\.com|youtu\.be)/").expect("regex válida")
});

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
    url: Option<String>,
}

/// Resolver backed by the `yt-dlp` executable.
pub struct YtDlpResolver {
    program: String,
    rate_limiter: Semaphore,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<String>, max_concurrent: usize) -> Self {
        Self {
            program: program.into(),
            // Limitar requests concurrentes para evitar rate limiting
            rate_limiter: Semaphore::new(max_concurrent.max(1)),
        }
    }

    pub fn is_youtube_url(query: &str) -> bool {
        YOUTUBE_URL.is_match(query.trim())
    }

    /// Whether the query should be looked up as a URL rather than searched.
    pub fn is_direct_url(query: &str) -> bool {
        let query = query.trim();
        Self::is_youtube_url(query)
            || url::Url::parse(query)
                .map(|url| matches!(url.scheme(), "http" | "https"))
                .unwrap_or(false)
    }

    async fn run(&self, args: &[&str]) -> Result<String, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Failed(e.to_string()))?;

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| ResolveError::Failed(format!("Error al ejecutar yt-dlp: {e}")))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp falló: {}", error.trim());
            return Err(ResolveError::Failed(format!("yt-dlp error: {}", error.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<TrackRef, ResolveError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolveError::NotFound(String::new()));
        }

        let stdout = if Self::is_direct_url(query) {
            debug!("📊 Obteniendo info de: {}", query);
            self.run(&["--no-playlist", "--dump-json", "--no-warnings", query])
                .await?
        } else {
            info!("🔍 Buscando en YouTube: {}", query);
            let search = format!("ytsearch1:{query}");
            self.run(&[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search,
            ])
            .await?
        };

        let track = parse_first_track(&stdout)
            .ok_or_else(|| ResolveError::NotFound(query.to_string()))?;
        info!("✅ Encontrado: {} → {}", track.title(), track.locator());
        Ok(track)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackRef>, ResolveError> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Err(ResolveError::NotFound(query.to_string()));
        }

        info!("🔍 Buscando {} resultados en YouTube: {}", limit, query);
        let search = format!("ytsearch{limit}:{query}");
        let stdout = self
            .run(&[
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search,
            ])
            .await?;

        let tracks = parse_tracks(&stdout, limit);
        if tracks.is_empty() {
            return Err(ResolveError::NotFound(query.to_string()));
        }
        debug!("✅ {} resultados para '{}'", tracks.len(), query);
        Ok(tracks)
    }
}

/// Playable entries of `--dump-json` output, one JSON object per line.
fn parse_tracks(stdout: &str, limit: usize) -> Vec<TrackRef> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
        .filter_map(info_to_track)
        .take(limit)
        .collect()
}

/// First line of `--dump-json` output that describes a playable entry.
fn parse_first_track(stdout: &str) -> Option<TrackRef> {
    parse_tracks(stdout, 1).into_iter().next()
}

fn info_to_track(info: YtDlpInfo) -> Option<TrackRef> {
    let locator = info
        .webpage_url
        .or_else(|| info.url.filter(|url| url.starts_with("http")))
        .or_else(|| info.id.map(|id| format!("https://www.youtube.com/watch?v={id}")))?;
    let title = info.title.unwrap_or_else(|| "Unknown".to_string());
    let duration = info
        .duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| d.round() as u64)
        .unwrap_or(0);

    Some(TrackRef::new(locator, title, duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_youtube_url_detection() {
        assert!(YtDlpResolver::is_youtube_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(YtDlpResolver::is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(YtDlpResolver::is_youtube_url("music.youtube.com/watch?v=test"));
        assert!(!YtDlpResolver::is_youtube_url("https://example.com/video"));
        assert!(!YtDlpResolver::is_youtube_url("nhạc tết youtube"));
    }

    #[test]
    fn test_direct_url_detection() {
        assert!(YtDlpResolver::is_direct_url("https://example.com/song.mp3"));
        assert!(YtDlpResolver::is_direct_url("youtu.be/abc"));
        assert!(!YtDlpResolver::is_direct_url("ngày tết quê em"));
        assert!(!YtDlpResolver::is_direct_url("ftp://example.com/song.mp3"));
    }

    #[test]
    fn test_parse_full_info() {
        let stdout = r#"{"id":"abc","title":"Ngày Tết Quê Em","duration":183.4,"webpage_url":"https://www.youtube.com/watch?v=abc"}"#;
        let track = parse_first_track(stdout).unwrap();

        assert_eq!(track.locator(), "https://www.youtube.com/watch?v=abc");
        assert_eq!(track.title(), "Ngày Tết Quê Em");
        assert_eq!(track.duration_secs(), 183);
    }

    #[test]
    fn test_parse_flat_search_entry() {
        let stdout = "WARNING: noise\n{\"id\":\"xyz\",\"title\":\"Xuân\",\"url\":\"xyz\"}\n";
        let track = parse_first_track(stdout).unwrap();

        assert_eq!(track.locator(), "https://www.youtube.com/watch?v=xyz");
        assert_eq!(track.duration_secs(), 0);
    }

    #[test]
    fn test_parse_search_results() {
        let stdout = concat!(
            "{\"id\":\"a1\",\"title\":\"Xuân Về\",\"url\":\"a1\",\"duration\":200}\n",
            "{\"title\":\"sin id\"}\n",
            "{\"id\":\"b2\",\"title\":\"Tết Đến\",\"url\":\"b2\"}\n",
            "{\"id\":\"c3\",\"title\":\"Mùa Xuân\",\"url\":\"c3\"}\n",
        );

        let titles: Vec<String> = parse_tracks(stdout, 2)
            .iter()
            .map(|t| t.title().to_string())
            .collect();
        assert_eq!(titles, vec!["Xuân Về", "Tết Đến"]);
        assert_eq!(parse_tracks(stdout, 5).len(), 3);
    }

    #[test]
    fn test_parse_empty_output() {
        assert_eq!(parse_first_track(""), None);
        assert_eq!(parse_first_track("{\"title\":\"sin id\"}"), None);
    }
}
