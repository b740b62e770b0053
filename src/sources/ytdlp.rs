use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{MetadataResolver, PlaylistEntry, PlaylistMetadata, TrackMetadata};
use crate::error::ResolveError;

/// Resolver que delega en el ejecutable `yt-dlp`
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    binary: String,
    timeout: Duration,
    max_playlist_size: usize,
}

/// Subset of the `yt-dlp -J` output we care about.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    entries: Vec<YtDlpInfo>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, timeout: Duration, max_playlist_size: usize) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            max_playlist_size,
        }
    }

    /// Ejecuta yt-dlp y devuelve su stdout
    async fn run(&self, url: &str, args: &[&str]) -> Result<Vec<u8>, ResolveError> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(args)
            .args(["--quiet", "--no-warnings", "--socket-timeout", "15"])
            .arg(url)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ResolveError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("yt-dlp falló para {}: {}", url, stderr);
            return Err(ResolveError::Failed {
                url: url.to_string(),
                stderr,
            });
        }

        Ok(output.stdout)
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new("yt-dlp", Duration::from_secs(30), 100)
    }
}

#[async_trait]
impl MetadataResolver for YtDlpResolver {
    async fn resolve_track(&self, url: &str) -> Result<TrackMetadata, ResolveError> {
        validate_url(url)?;
        debug!("🔍 Resolviendo track: {}", url);

        let stdout = self.run(url, &["-J", "--no-playlist"]).await?;
        let track = parse_track(&stdout, url)?;

        info!("🎵 Track resuelto: {} ({})", track.title, track.video_id);
        Ok(track)
    }

    async fn resolve_playlist(&self, url: &str) -> Result<Option<PlaylistMetadata>, ResolveError> {
        validate_url(url)?;
        debug!("🔍 Resolviendo playlist: {}", url);

        let limit = self.max_playlist_size.to_string();
        let stdout = self
            .run(url, &["-J", "--flat-playlist", "--playlist-end", &limit])
            .await?;

        let playlist = parse_playlist(&stdout, self.max_playlist_size)?;
        if let Some(playlist) = &playlist {
            info!(
                "📋 Playlist resuelta: {} ({} entradas)",
                playlist.title.as_deref().unwrap_or("sin título"),
                playlist.entries.len()
            );
        }

        Ok(playlist)
    }
}

fn validate_url(url: &str) -> Result<(), ResolveError> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(ResolveError::InvalidUrl(url.to_string())),
    }
}

fn parse_track(stdout: &[u8], requested_url: &str) -> Result<TrackMetadata, ResolveError> {
    let info: YtDlpInfo = serde_json::from_slice(stdout)?;

    let video_id = info.id.ok_or_else(|| ResolveError::Failed {
        url: requested_url.to_string(),
        stderr: "la respuesta no contiene id".to_string(),
    })?;

    Ok(TrackMetadata {
        title: info.title.unwrap_or_else(|| "Unknown".to_string()),
        url: info
            .webpage_url
            .unwrap_or_else(|| requested_url.to_string()),
        uploader: info.uploader,
        duration: info
            .duration
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64),
        thumbnail: info.thumbnail,
        video_id,
    })
}

fn parse_playlist(stdout: &[u8], limit: usize) -> Result<Option<PlaylistMetadata>, ResolveError> {
    let info: YtDlpInfo = serde_json::from_slice(stdout)?;

    if info.kind.as_deref() != Some("playlist") {
        return Ok(None);
    }

    let entries = info
        .entries
        .into_iter()
        .filter_map(|entry| {
            let video_id = entry.id?;
            let url = match entry.url.or(entry.webpage_url) {
                Some(url) if url.starts_with("http") => url,
                _ => format!("https://www.youtube.com/watch?v={}", video_id),
            };
            Some(PlaylistEntry {
                video_id,
                url,
                title: entry.title,
            })
        })
        .take(limit)
        .collect();

    Ok(Some(PlaylistMetadata {
        title: info.title,
        entries,
    }))
}
