//! Vision inference collaborator.
//!
//! The engine's contract ends at producing three representative frames plus
//! a fixed instruction; this client ships them to an external vision model
//! and parses the structured verdict out of the reply. No credential means
//! the whole video-insight operation reports skipped, never an error.

use anyhow::{bail, Context, Result};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Fixed instruction sent with the frames.
pub const INSIGHT_PROMPT: &str = "\
Analyze these 3 frames from a product review video.
1. Is the reviewer holding the product? (Yes/No)
2. Does the product look broken, cheap, or fake?
3. Is the reviewer making a disgusted or angry face?

Return JSON:
{ \"reviewerHoldingProduct\": boolean, \"visualDefects\": string, \"angryFaceDetected\": boolean }";

/// Credentials and endpoint for the vision collaborator.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
}

impl VisionConfig {
    /// Built from the environment at startup; `None` when no key is set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("SCOUT_VISION_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty())?;
        Some(Self {
            api_key,
            endpoint: std::env::var("SCOUT_VISION_ENDPOINT")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            model: std::env::var("SCOUT_VISION_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
        })
    }
}

/// Structured judgment returned by the vision model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoVerdict {
    pub reviewer_holding_product: bool,
    #[serde(default)]
    pub visual_defects: String,
    pub angry_face_detected: bool,
}

pub struct VisionClient {
    http: reqwest::Client,
    config: VisionConfig,
}

impl VisionClient {
    pub fn new(config: VisionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build vision HTTP client")?;
        Ok(Self { http, config })
    }

    /// Ship JPEG frames plus the fixed instruction, parse the verdict.
    pub async fn judge_frames(&self, frames: &[Vec<u8>]) -> Result<VideoVerdict> {
        if frames.is_empty() {
            bail!("no frames to judge");
        }

        let mut parts = vec![json!({ "text": INSIGHT_PROMPT })];
        for frame in frames {
            parts.push(json!({
                "inline_data": {
                    "mime_type": "image/jpeg",
                    "data": base64::engine::general_purpose::STANDARD.encode(frame),
                }
            }));
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.endpoint, self.config.model, self.config.api_key
        );
        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": { "response_mime_type": "application/json" },
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("vision collaborator unreachable")?;
        let status = response.status();
        if !status.is_success() {
            bail!("vision collaborator answered {status}");
        }

        let reply: Value = response
            .json()
            .await
            .context("vision reply was not JSON")?;
        parse_verdict(&reply)
    }
}

/// Dig the verdict out of a generateContent-shaped reply. Tolerates the
/// model wrapping its JSON in a code fence.
pub fn parse_verdict(reply: &Value) -> Result<VideoVerdict> {
    let text = reply
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .context("vision reply carried no text part")?;
    let verdict: VideoVerdict = serde_json::from_str(strip_code_fence(text))
        .context("vision verdict did not match the expected shape")?;
    Ok(verdict)
}

/// Strip a ``` fence (with optional language tag) around a payload.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_strip_code_fence_variants() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_parse_verdict_from_fenced_reply() {
        let reply = json!({
            "candidates": [{
                "content": { "parts": [{
                    "text": "```json\n{\"reviewerHoldingProduct\": true, \"visualDefects\": \"scratched casing\", \"angryFaceDetected\": false}\n```"
                }]}
            }]
        });
        let verdict = parse_verdict(&reply).expect("verdict should parse");
        assert!(verdict.reviewer_holding_product);
        assert_eq!(verdict.visual_defects, "scratched casing");
        assert!(!verdict.angry_face_detected);
    }

    #[test]
    fn test_parse_verdict_missing_text_part() {
        let reply = json!({ "candidates": [] });
        assert!(parse_verdict(&reply).is_err());
    }

    #[tokio::test]
    async fn test_judge_frames_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1beta/models/.*:generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{
                        "text": "{\"reviewerHoldingProduct\": false, \"visualDefects\": \"none\", \"angryFaceDetected\": true}"
                    }]}
                }]
            })))
            .mount(&server)
            .await;

        let client = VisionClient::new(VisionConfig {
            api_key: "test-key".into(),
            endpoint: server.uri(),
            model: "test-model".into(),
        })
        .expect("client builds");

        let verdict = client
            .judge_frames(&[vec![0xFF, 0xD8, 0xFF]])
            .await
            .expect("judgment should parse");
        assert!(verdict.angry_face_detected);
        assert!(!verdict.reviewer_holding_product);
    }
}
