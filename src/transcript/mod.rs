//! Transcript acquisition chain.
//!
//! Two strategies, tried through the fallback controller:
//! 1. `direct-caption-api`: pull the caption track URL out of the watch
//!    page's embedded player response and fetch it as json3.
//! 2. `yt-dlp-subprocess`: ask yt-dlp for the video metadata and fetch the
//!    English automatic-caption (or subtitle) json3 track it advertises.
//!    Robust against IP-level blocks of the direct surface.
//!
//! Both hand their payloads to the normalizer, which accepts either upstream
//! shape.

pub mod normalize;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::fallback::Strategy;
use self::normalize::{parse_caption_payload, TranscriptCue};

/// Video identifiers are URL-safe base64-ish tokens. Anything else is a
/// malformed input, rejected before any chain runs.
pub fn valid_video_id(id: &str) -> bool {
    let len_ok = (6..=64).contains(&id.len());
    len_ok
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Pull the first caption track `baseUrl` out of a watch page's embedded
/// player response.
pub fn extract_caption_base_url(watch_html: &str) -> Option<String> {
    let start = watch_html.find(r#""captionTracks":"#)?;
    let window = &watch_html[start..];
    let marker = r#""baseUrl":"#;
    let url_start = window.find(marker)? + marker.len();
    let rest = window[url_start..].trim_start();
    let rest = rest.strip_prefix('"')?;
    let url_end = rest.find('"')?;
    let raw = &rest[..url_end];
    Some(raw.replace(r"\u0026", "&").replace(r"\/", "/"))
}

/// Fetch a caption URL and normalize whatever shape comes back.
pub async fn fetch_caption_payload(
    http: &reqwest::Client,
    url: &str,
) -> Result<Vec<TranscriptCue>> {
    let response = http
        .get(url)
        .send()
        .await
        .context("caption fetch failed")?;
    let status = response.status();
    if !status.is_success() {
        bail!("caption host answered {status}");
    }
    let body = response.text().await.context("caption body unreadable")?;
    let cues = parse_caption_payload(&body)?;
    if cues.is_empty() {
        bail!("caption track contained no usable cues");
    }
    Ok(cues)
}

/// Strategy 1: direct caption surface, no subprocess.
pub struct DirectCaptionApi {
    pub http: reqwest::Client,
    pub video_id: String,
}

#[async_trait]
impl Strategy<Vec<TranscriptCue>> for DirectCaptionApi {
    fn name(&self) -> &'static str {
        "direct-caption-api"
    }

    async fn attempt(&self) -> Result<Vec<TranscriptCue>> {
        let watch_url = format!("https://www.youtube.com/watch?v={}", self.video_id);
        let watch_html = self
            .http
            .get(&watch_url)
            .send()
            .await
            .context("watch page fetch failed")?
            .text()
            .await
            .context("watch page body unreadable")?;

        let base_url = extract_caption_base_url(&watch_html)
            .context("no caption tracks in player response")?;
        let track_url = format!("{base_url}&fmt=json3");
        let cues = fetch_caption_payload(&self.http, &track_url).await?;
        info!(
            "direct caption api: {} cues for {}",
            cues.len(),
            self.video_id
        );
        Ok(cues)
    }
}

/// Strategy 2: yt-dlp subprocess. The subprocess is spawned, awaited, and
/// fully reaped inside this attempt; no resource outlives it.
pub struct YtDlpCaptions {
    pub http: reqwest::Client,
    pub video_id: String,
}

impl YtDlpCaptions {
    /// Find the en json3 track URL in yt-dlp's info JSON: automatic
    /// captions first (most common), manual subtitles second. A missing
    /// field means "try the next one", not "no track".
    fn json3_track_url(info: &Value) -> Option<String> {
        for field in ["automatic_captions", "subtitles"] {
            let Some(tracks) = info
                .get(field)
                .and_then(|f| f.get("en"))
                .and_then(Value::as_array)
            else {
                continue;
            };
            if let Some(url) = tracks
                .iter()
                .find(|t| t.get("ext").and_then(Value::as_str) == Some("json3"))
                .and_then(|t| t.get("url"))
                .and_then(Value::as_str)
            {
                return Some(url.to_string());
            }
        }
        None
    }
}

#[async_trait]
impl Strategy<Vec<TranscriptCue>> for YtDlpCaptions {
    fn name(&self) -> &'static str {
        "yt-dlp-subprocess"
    }

    async fn attempt(&self) -> Result<Vec<TranscriptCue>> {
        let url = format!("https://www.youtube.com/watch?v={}", self.video_id);
        let output = tokio::process::Command::new("yt-dlp")
            .args(["-J", "--skip-download", "--no-warnings", &url])
            .output()
            .await
            .context("failed to spawn yt-dlp (is it installed?)")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.chars().take(200).collect::<String>()
            );
        }

        let info: Value =
            serde_json::from_slice(&output.stdout).context("yt-dlp emitted invalid JSON")?;
        let track_url =
            Self::json3_track_url(&info).context("yt-dlp found no en json3 caption track")?;

        let cues = fetch_caption_payload(&self.http, &track_url).await?;
        info!("yt-dlp fallback: {} cues for {}", cues.len(), self.video_id);
        Ok(cues)
    }
}
