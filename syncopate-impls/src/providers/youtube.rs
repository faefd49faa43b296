use std::process::Stdio;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use tokio::process::Command;

use syncopate_core::{MusicProvider, ProviderError, ProviderKind, ProviderResult, StreamHandle};

const DEFAULT_BINARY: &str = "yt-dlp";

/// Resolves tracks through YouTube search, via yt-dlp.
///
/// The resolved stream url is probed with a HEAD request before it is handed
/// out, so clients never receive a handle that is already dead.
pub struct YouTubeProvider {
    binary: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    entries: Vec<ResolvedVideo>,
}

#[derive(Debug, Deserialize)]
struct ResolvedVideo {
    id: String,
    duration: Option<f64>,
    /// The url of the selected format, when yt-dlp picked one
    url: Option<String>,
    formats: Option<Vec<Format>>,
}

#[derive(Debug, Deserialize)]
struct Format {
    url: String,
    acodec: Option<String>,
    abr: Option<f64>,
}

impl YouTubeProvider {
    pub fn new() -> Self {
        Self::with_binary(DEFAULT_BINARY)
    }

    /// Uses a specific yt-dlp binary instead of the one on PATH.
    pub fn with_binary<S>(binary: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            binary: binary.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn search(&self, query: &str) -> ProviderResult<SearchResults> {
        let output = Command::new(&self.binary)
            .args(["--no-warnings", "-J", "-f", "bestaudio/best"])
            .arg(format!("ytsearch1:{query}"))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("yt-dlp did not run: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);

            return Err(ProviderError::Unavailable(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ProviderError::Unavailable(format!("unexpected yt-dlp output: {e}")))
    }

    /// Checks that the resolved url actually responds before handing it out.
    async fn probe(&self, url: &str) -> ProviderResult<()> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("stream probe failed: {e}")))?;

        let status = response.status();

        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!(
                "stream probe answered with {status}"
            )));
        }

        Ok(())
    }
}

impl ResolvedVideo {
    /// The playable url: the format yt-dlp selected, or the best audio
    /// format we can find ourselves.
    fn stream_url(&self) -> Option<String> {
        if let Some(url) = &self.url {
            return Some(url.clone());
        }

        self.formats.as_ref().and_then(|formats| {
            formats
                .iter()
                .filter(|f| f.acodec.as_deref().map(|c| c != "none").unwrap_or_default())
                .max_by(|a, b| {
                    a.abr
                        .unwrap_or_default()
                        .total_cmp(&b.abr.unwrap_or_default())
                })
                .map(|f| f.url.clone())
        })
    }
}

impl Default for YouTubeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MusicProvider for YouTubeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::YouTube
    }

    async fn resolve(&self, title: &str, artist: &str) -> ProviderResult<StreamHandle> {
        let results = self.search(&format!("{title} {artist}")).await?;

        let video = results
            .entries
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound {
                title: title.to_string(),
                artist: artist.to_string(),
            })?;

        let url = video.stream_url().ok_or_else(|| ProviderError::NotFound {
            title: title.to_string(),
            artist: artist.to_string(),
        })?;

        debug!("Resolved \"{}\" by \"{}\" to video {}", title, artist, video.id);

        self.probe(&url).await?;

        Ok(StreamHandle {
            url,
            duration_millis: video.duration.map(|seconds| (seconds * 1000.0) as u64),
        })
    }
}
