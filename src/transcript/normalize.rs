//! Canonicalize upstream caption payloads into one cue-list shape.
//!
//! Two upstream formats exist: a pre-segmented cue array, and the json3
//! event stream where each event carries millisecond offsets and text
//! segments. Both normalize to [`TranscriptCue`] sequences. Source order is
//! preserved as-is; temporal ordering is an upstream guarantee, not
//! something verified here.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// One timed transcript segment. Insertion order is temporal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptCue {
    pub text: String,
    /// Start offset in seconds, ≥ 0.
    pub start: f64,
    /// Duration in seconds, ≥ 0.
    pub duration: f64,
}

/// Pre-segmented cue as served by the direct caption surface.
#[derive(Debug, Deserialize)]
struct RawCue {
    #[serde(default)]
    text: String,
    #[serde(default)]
    start: f64,
    #[serde(default)]
    duration: f64,
}

/// json3 caption track: `{ "events": [...] }`.
#[derive(Debug, Deserialize)]
pub struct Json3Track {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    #[serde(rename = "tStartMs", default)]
    t_start_ms: f64,
    #[serde(rename = "dDurationMs", default)]
    d_duration_ms: f64,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

/// Normalize a json3 event stream: segments join with single spaces,
/// millisecond fields divide by 1000.0, and events with no usable text are
/// dropped since they carry no transcript signal.
pub fn from_json3(track: Json3Track) -> Vec<TranscriptCue> {
    track
        .events
        .into_iter()
        .filter_map(|event| {
            let text = event
                .segs
                .iter()
                .map(|s| s.utf8.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if text.is_empty() {
                return None;
            }
            Some(TranscriptCue {
                text,
                start: event.t_start_ms / 1000.0,
                duration: event.d_duration_ms / 1000.0,
            })
        })
        .collect()
}

/// Normalize a pre-segmented cue array, dropping empty-text entries.
fn from_cue_array(cues: Vec<RawCue>) -> Vec<TranscriptCue> {
    cues.into_iter()
        .filter_map(|cue| {
            let text = cue.text.trim().to_string();
            if text.is_empty() {
                return None;
            }
            Some(TranscriptCue {
                text,
                start: cue.start,
                duration: cue.duration,
            })
        })
        .collect()
}

/// Parse either upstream payload shape into the canonical cue sequence.
///
/// A JSON array is treated as a pre-segmented cue list; a JSON object is
/// treated as a json3 track. Either strategy in the transcript chain may
/// hand back either shape.
pub fn parse_caption_payload(body: &str) -> Result<Vec<TranscriptCue>> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('[') {
        let cues: Vec<RawCue> = serde_json::from_str(trimmed)?;
        Ok(from_cue_array(cues))
    } else if trimmed.starts_with('{') {
        let track: Json3Track = serde_json::from_str(trimmed)?;
        Ok(from_json3(track))
    } else {
        bail!("caption payload is neither a cue array nor a json3 track");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json3_event_normalizes_to_cue() {
        let body = r#"{"events":[{"tStartMs":1000,"dDurationMs":2000,"segs":[{"utf8":"hello"},{"utf8":"world"}]}]}"#;
        let cues = parse_caption_payload(body).expect("valid payload");
        assert_eq!(
            cues,
            vec![TranscriptCue {
                text: "hello world".to_string(),
                start: 1.0,
                duration: 2.0,
            }]
        );
    }

    #[test]
    fn test_whitespace_only_events_are_dropped() {
        let body = r#"{"events":[{"tStartMs":0,"dDurationMs":10,"segs":[{"utf8":" "}]}]}"#;
        let cues = parse_caption_payload(body).expect("valid payload");
        assert!(cues.is_empty());
    }

    #[test]
    fn test_events_with_no_segments_are_dropped() {
        let body = r#"{"events":[{"tStartMs":0,"dDurationMs":10},{"tStartMs":500,"dDurationMs":10,"segs":[{"utf8":"kept"}]}]}"#;
        let cues = parse_caption_payload(body).expect("valid payload");
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "kept");
        assert_eq!(cues[0].start, 0.5);
    }

    #[test]
    fn test_source_order_is_preserved_not_resorted() {
        // Upstream guarantees temporal order; if it lies, we keep its order.
        let body = r#"{"events":[
            {"tStartMs":5000,"dDurationMs":1000,"segs":[{"utf8":"second"}]},
            {"tStartMs":1000,"dDurationMs":1000,"segs":[{"utf8":"first"}]}
        ]}"#;
        let cues = parse_caption_payload(body).expect("valid payload");
        assert_eq!(cues[0].text, "second");
        assert_eq!(cues[1].text, "first");
    }

    #[test]
    fn test_pre_segmented_cue_array() {
        let body = r#"[{"text":"hi there","start":0.5,"duration":1.5},{"text":"  ","start":2.0,"duration":1.0}]"#;
        let cues = parse_caption_payload(body).expect("valid payload");
        assert_eq!(
            cues,
            vec![TranscriptCue {
                text: "hi there".to_string(),
                start: 0.5,
                duration: 1.5,
            }]
        );
    }

    #[test]
    fn test_garbage_payload_is_rejected() {
        assert!(parse_caption_payload("<!doctype html><html>").is_err());
        assert!(parse_caption_payload("").is_err());
    }
}
