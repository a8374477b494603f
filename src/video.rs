//! Representative-frame production for video insight.
//!
//! Downloads the lowest-quality mp4 rendition (visual context only), probes
//! its duration, and grabs one downscaled frame at the 10%, 50%, and 80%
//! marks. Everything lands in a temp directory that is removed when the
//! scope ends, success or failure.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Sample points as fractions of video duration.
pub const FRAME_MARKS: [f64; 3] = [0.10, 0.50, 0.80];

/// Frames are downscaled to this resolution; the vision model only needs
/// small images, and bandwidth is the cost.
pub const FRAME_WIDTH: u32 = 640;
pub const FRAME_HEIGHT: u32 = 360;

/// JPEG frames plus the probed duration.
#[derive(Debug)]
pub struct FramePack {
    pub frames: Vec<Vec<u8>>,
    pub duration_secs: f64,
}

/// Timestamps (seconds) to sample for a video of the given duration.
pub fn frame_timestamps(duration_secs: f64) -> [f64; 3] {
    [
        duration_secs * FRAME_MARKS[0],
        duration_secs * FRAME_MARKS[1],
        duration_secs * FRAME_MARKS[2],
    ]
}

/// Produce the three representative frames for a video URL.
///
/// The downloaded file is a scoped resource: the temp directory is removed
/// unconditionally when this returns, including on the error path.
pub async fn representative_frames(video_url: &str) -> Result<FramePack> {
    let workdir = tempfile::tempdir().context("failed to create temp dir")?;
    let video_path = download_video(video_url, workdir.path()).await?;
    let duration_secs = probe_duration(&video_path).await?;
    if duration_secs <= 0.0 {
        bail!("video reports zero duration");
    }

    let mut frames = Vec::with_capacity(FRAME_MARKS.len());
    for (index, timestamp) in frame_timestamps(duration_secs).iter().enumerate() {
        match extract_frame(&video_path, *timestamp, workdir.path(), index).await {
            Ok(bytes) => frames.push(bytes),
            Err(e) => warn!("frame at {timestamp:.1}s failed: {e:#}"),
        }
    }
    if frames.is_empty() {
        bail!("no frames could be extracted");
    }

    info!(
        "extracted {} frames from {duration_secs:.1}s of video",
        frames.len()
    );
    Ok(FramePack {
        frames,
        duration_secs,
    })
    // workdir drops here, deleting the video and frames.
}

/// Download the worst mp4 rendition via yt-dlp.
async fn download_video(video_url: &str, dir: &Path) -> Result<PathBuf> {
    let target = dir.join("video.mp4");
    let template = dir.join("video.%(ext)s");
    let output = tokio::process::Command::new("yt-dlp")
        .args([
            "-f",
            "worst[ext=mp4]",
            "-o",
            &template.to_string_lossy(),
            "--no-warnings",
            "--quiet",
            video_url,
        ])
        .output()
        .await
        .context("failed to spawn yt-dlp (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "yt-dlp download exited with {}: {}",
            output.status,
            stderr.chars().take(200).collect::<String>()
        );
    }
    if !target.exists() {
        bail!("yt-dlp reported success but produced no mp4");
    }
    Ok(target)
}

/// Probe duration in seconds via ffprobe.
async fn probe_duration(video_path: &Path) -> Result<f64> {
    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(video_path)
        .output()
        .await
        .context("failed to spawn ffprobe (is ffmpeg installed?)")?;

    if !output.status.success() {
        bail!("ffprobe exited with {}", output.status);
    }
    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .context("ffprobe emitted an unparseable duration")
}

/// Grab one downscaled JPEG frame at the given timestamp.
async fn extract_frame(
    video_path: &Path,
    timestamp: f64,
    dir: &Path,
    index: usize,
) -> Result<Vec<u8>> {
    let frame_path = dir.join(format!("frame_{index}.jpg"));
    let output = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-ss", &format!("{timestamp:.3}")])
        .arg("-i")
        .arg(video_path)
        .args([
            "-frames:v",
            "1",
            "-vf",
            &format!("scale={FRAME_WIDTH}:{FRAME_HEIGHT}"),
        ])
        .arg(&frame_path)
        .output()
        .await
        .context("failed to spawn ffmpeg")?;

    if !output.status.success() {
        bail!("ffmpeg exited with {}", output.status);
    }
    tokio::fs::read(&frame_path)
        .await
        .context("frame file unreadable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_timestamps_hit_the_marks() {
        let ts = frame_timestamps(100.0);
        assert_eq!(ts, [10.0, 50.0, 80.0]);
    }

    #[test]
    fn test_frame_timestamps_scale_with_duration() {
        let ts = frame_timestamps(30.0);
        assert!((ts[0] - 3.0).abs() < 1e-9);
        assert!((ts[2] - 24.0).abs() < 1e-9);
    }
}
