use async_trait::async_trait;
use serde::Deserialize;
use std::{process::Stdio, time::Duration};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::TrackExtractor;
use crate::audio::track::{Requester, Track};
use crate::config::Config;
use crate::error::ExtractError;

/// Resolves queries with the yt-dlp binary.
pub struct YtDlpExtractor {
    binary: String,
    timeout: Duration,
    playlist_limit: Option<usize>,
}

/// The subset of a `--dump-json` document we use.
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    #[serde(default = "unknown_title")]
    title: String,
    #[serde(default)]
    webpage_url: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

fn unknown_title() -> String {
    "Unknown Title".to_string()
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<String>, timeout: Duration, playlist_limit: Option<usize>) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            playlist_limit,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.ytdlp_path.clone(),
            config.extraction_timeout,
            config.allow_playlists.then_some(config.max_playlist_size),
        )
    }

    /// Checks that the binary runs at all.
    pub async fn verify(&self) -> Result<String, ExtractError> {
        let output = Command::new(&self.binary).arg("--version").output().await?;
        if !output.status.success() {
            return Err(ExtractError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("✅ yt-dlp version: {}", version);
        Ok(version)
    }

    fn arguments(&self, query: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--format".to_string(),
            "bestaudio/best".to_string(),
        ];
        match self.playlist_limit {
            Some(limit) => {
                args.push("--yes-playlist".to_string());
                args.push("--playlist-end".to_string());
                args.push(limit.to_string());
            }
            None => args.push("--no-playlist".to_string()),
        }
        args.push(search_target(query));
        args
    }
}

/// URLs go to yt-dlp as-is; anything else becomes a search.
fn search_target(query: &str) -> String {
    let query = query.trim();
    match url::Url::parse(query) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => query.to_string(),
        _ => format!("ytsearch:{}", query),
    }
}

/// Parses one JSON document per line, skipping lines that are not entries
/// and entries without a stream url.
fn parse_entries(stdout: &str, requester: &Requester) -> Vec<Track> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unparseable yt-dlp line: {}", e);
                None
            }
        })
        .filter(|entry| !entry.url.is_empty())
        .map(|entry| {
            let secs = entry.duration.filter(|d| d.is_finite() && *d > 0.0).unwrap_or(0.0);
            Track::new(entry.title, entry.webpage_url, entry.url, requester.clone())
                .with_thumbnail(entry.thumbnail.unwrap_or_default())
                .with_duration_secs(secs as u64)
        })
        .collect()
}

#[async_trait]
impl TrackExtractor for YtDlpExtractor {
    async fn resolve(&self, query: &str, requester: &Requester) -> Result<Vec<Track>, ExtractError> {
        info!("🔍 Resolving: {}", query);

        let mut cmd = Command::new(&self.binary);
        cmd.args(self.arguments(query))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ExtractError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("yt-dlp failed for {}: {}", query, stderr);
            return Err(ExtractError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let tracks = parse_entries(&String::from_utf8_lossy(&output.stdout), requester);
        debug!("yt-dlp resolved {} track(s) for {}", tracks.len(), query);
        Ok(tracks)
    }
}
