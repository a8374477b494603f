//! Operation-level engine API.
//!
//! One method per inbound operation. Each acquisition provisions its own
//! session, runs strictly sequential steps (navigate → settle → snapshot →
//! classify → extract), and releases the session before the result is
//! mapped, regardless of which step failed. Infrastructure faults are
//! translated into [`EngineError`] variants at this boundary; the caller
//! never sees a raw fault.

use anyhow::Result as AnyResult;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::detect::{self, BlockVerdict};
use crate::errors::EngineError;
use crate::extract::{self, CurrencyScan, PriceSignal, SelectorScan};
use crate::fallback::{self, ChainExhausted, FallbackAttempt, Strategy};
use crate::search::{DuckDuckGoSearch, GoogleSearch, SearchHit};
use crate::session::{Session, SessionProvisioner};
use crate::settle;
use crate::snapshot::{AcquisitionTarget, PageSnapshot};
use crate::transcript::normalize::TranscriptCue;
use crate::transcript::{self, DirectCaptionApi, YtDlpCaptions};
use crate::video;
use crate::vision::{VideoVerdict, VisionClient};

/// Transcript operation result.
#[derive(Debug, Serialize)]
pub struct TranscriptResult {
    pub video_id: String,
    pub cues: Vec<TranscriptCue>,
    /// Per-strategy attempt log, retained for observability.
    pub diagnostics: Vec<FallbackAttempt>,
}

/// Link verification result. Never error-shaped for a reachable page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkVerdict {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Scrape result: content, or a success-shaped block report so the caller
/// can tell "target is blocked" apart from "our infrastructure failed".
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ScrapeOutcome {
    Content(PageContent),
    Blocked(BlockReport),
}

#[derive(Debug, Serialize)]
pub struct PageContent {
    pub final_url: String,
    /// Raw markup, capped per the output contract.
    pub raw_markup: String,
    /// Cleaned visible text, capped per the output contract.
    pub cleaned_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockReport {
    pub block_type: String,
    pub trigger: String,
    pub title: String,
}

/// Market deep-dive result.
#[derive(Debug, Serialize)]
pub struct MarketReport {
    pub title: String,
    pub price: String,
    pub url: String,
    pub available: bool,
}

/// Video insight result: a verdict, or skipped when the vision collaborator
/// is not configured.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum VideoInsight {
    Skipped { reason: String },
    Report { data: VideoVerdict },
}

/// The acquisition resilience engine.
pub struct Engine {
    config: Arc<EngineConfig>,
    provisioner: Arc<SessionProvisioner>,
    http: reqwest::Client,
    vision: Option<VisionClient>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> AnyResult<Self> {
        let config = Arc::new(config);
        let provisioner = Arc::new(SessionProvisioner::new(Arc::clone(&config)));

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.nav_timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(crate::session::stealth::USER_AGENT_POOL[0])
            .build()?;

        let vision = match &config.vision {
            Some(vc) => Some(VisionClient::new(vc.clone())?),
            None => None,
        };

        Ok(Self {
            config,
            provisioner,
            http,
            vision,
        })
    }

    // ── Operations ──────────────────────────────────────────────────────

    /// Fetch a transcript through the caption fallback chain.
    pub async fn fetch_transcript(&self, video_id: &str) -> Result<TranscriptResult, EngineError> {
        // Malformed identifiers fail fast, bypassing the chain entirely.
        if !transcript::valid_video_id(video_id) {
            return Err(EngineError::Input(format!(
                "malformed video id: {video_id:?}"
            )));
        }

        let strategies: Vec<Box<dyn Strategy<Vec<TranscriptCue>>>> = vec![
            Box::new(DirectCaptionApi {
                http: self.http.clone(),
                video_id: video_id.to_string(),
            }),
            Box::new(YtDlpCaptions {
                http: self.http.clone(),
                video_id: video_id.to_string(),
            }),
        ];

        let chain = fallback::run("transcript", strategies)
            .await
            .map_err(|e| exhausted("transcript", e))?;

        Ok(TranscriptResult {
            video_id: video_id.to_string(),
            cues: chain.payload,
            diagnostics: chain.attempts,
        })
    }

    /// Verify that a link leads to real, on-target content.
    ///
    /// Policy: a navigation failure during verification reports
    /// `valid: false` with the failure as reason, never a soft success.
    /// Only session provisioning failure surfaces as an engine error.
    pub async fn verify_link(&self, url: &str) -> Result<LinkVerdict, EngineError> {
        let target = self.page_target(url)?;

        let mut session = self.provisioner.acquire().await?;
        let outcome = self.verify_inner(&session, &target).await;
        session.release().await;
        outcome
    }

    async fn verify_inner(
        &self,
        session: &Session,
        target: &AcquisitionTarget,
    ) -> Result<LinkVerdict, EngineError> {
        if let Err(e) = session
            .navigate_with_timeout(&target.locator, self.config.verify_timeout_ms)
            .await
        {
            info!("link invalid (navigation): {}: {e:#}", target.locator);
            return Ok(LinkVerdict {
                valid: false,
                reason: Some(format!("{e:#}")),
            });
        }

        let snapshot = session
            .snapshot()
            .await
            .map_err(|e| EngineError::Navigation(format!("{e:#}")))?;
        let verdict = detect::classify(&self.config.triggers, &snapshot, target);
        Ok(link_verdict(&verdict))
    }

    /// Scrape a dynamic page: settle, gate on the block classifier, then
    /// return capped markup and cleaned text.
    pub async fn scrape_page(&self, url: &str) -> Result<ScrapeOutcome, EngineError> {
        let target = self.page_target(url)?;

        let mut session = self.provisioner.acquire().await?;
        let outcome = self.scrape_inner(&session, &target).await;
        session.release().await;
        outcome
    }

    async fn scrape_inner(
        &self,
        session: &Session,
        target: &AcquisitionTarget,
    ) -> Result<ScrapeOutcome, EngineError> {
        session
            .navigate(&target.locator)
            .await
            .map_err(|e| EngineError::Navigation(format!("{e:#}")))?;

        if let Err(e) = settle::settle(session, &self.config.settle).await {
            // A mid-settle fault is not fatal; extract what rendered.
            warn!("settle aborted early: {e:#}");
        }

        let snapshot = session
            .snapshot()
            .await
            .map_err(|e| EngineError::Navigation(format!("{e:#}")))?;

        let verdict = detect::classify(&self.config.triggers, &snapshot, target);
        if let Some(report) = extraction_gate(&verdict, &snapshot)? {
            warn!(
                "bot detection triggered for {}: {}",
                target.locator, report.trigger
            );
            return Ok(ScrapeOutcome::Blocked(report));
        }

        let candidates =
            extract::collect_candidates(&snapshot.raw_markup, &self.config.price_selectors);
        if !candidates.is_empty() {
            info!(
                "found {} price candidates, best: {:?}",
                candidates.len(),
                candidates[0].raw_text
            );
        }

        Ok(ScrapeOutcome::Content(PageContent {
            final_url: snapshot.final_url.clone(),
            raw_markup: extract::cap_utf8(&snapshot.raw_markup, self.config.markup_cap).to_string(),
            cleaned_text: extract::cap_utf8(&snapshot.visible_text, self.config.text_cap)
                .to_string(),
        }))
    }

    /// Deep market verification for one product URL.
    pub async fn market_deep_dive(&self, url: &str) -> Result<MarketReport, EngineError> {
        let target = self.page_target(url)?;

        let mut session = self.provisioner.acquire().await?;
        let outcome = self.market_inner(&session, &target).await;
        session.release().await;
        outcome
    }

    async fn market_inner(
        &self,
        session: &Session,
        target: &AcquisitionTarget,
    ) -> Result<MarketReport, EngineError> {
        session
            .navigate(&target.locator)
            .await
            .map_err(|e| EngineError::Navigation(format!("{e:#}")))?;

        if let Err(e) = settle::settle(session, &self.config.settle).await {
            warn!("settle aborted early: {e:#}");
        }

        let snapshot = session
            .snapshot()
            .await
            .map_err(|e| EngineError::Navigation(format!("{e:#}")))?;

        let verdict = detect::classify(&self.config.triggers, &snapshot, target);
        if let Some(report) = extraction_gate(&verdict, &snapshot)? {
            return Err(EngineError::BlockDetected {
                block_type: report.block_type,
                trigger: report.trigger,
                title: report.title,
            });
        }

        // Price chain: selector table first, currency-pattern scan second.
        // Partial results beat total failure: a missing price becomes
        // "Unknown", not an error, as long as the page itself rendered.
        let chain: Vec<Box<dyn Strategy<PriceSignal>>> = vec![
            Box::new(SelectorScan {
                html: snapshot.raw_markup.clone(),
                table: self.config.price_selectors.clone(),
            }),
            Box::new(CurrencyScan {
                text: snapshot.visible_text.clone(),
            }),
        ];
        let price = match fallback::run("market-price", chain).await {
            Ok(chain) => chain.payload.display(),
            Err(exhausted) => {
                info!("no price signal: {}", exhausted.summary());
                "Unknown".to_string()
            }
        };

        let available = is_available(&snapshot, &self.config.unavailable_phrases);

        Ok(MarketReport {
            title: snapshot.title.clone(),
            price,
            url: target.locator.clone(),
            available,
        })
    }

    /// Produce three representative frames and ask the vision collaborator
    /// for a structured judgment.
    pub async fn video_insight(&self, url: &str) -> Result<VideoInsight, EngineError> {
        if url.trim().is_empty() {
            return Err(EngineError::Input("missing url".into()));
        }

        let Some(vision) = &self.vision else {
            return Ok(VideoInsight::Skipped {
                reason: "no vision credential configured".to_string(),
            });
        };

        let pack = video::representative_frames(url)
            .await
            .map_err(|e| EngineError::UpstreamUnavailable(format!("{e:#}")))?;

        let data = vision
            .judge_frames(&pack.frames)
            .await
            .map_err(|e| EngineError::UpstreamUnavailable(format!("{e:#}")))?;

        Ok(VideoInsight::Report { data })
    }

    /// Search for qualifying community discussion threads.
    pub async fn reddit_search(&self, query: &str) -> Result<Vec<SearchHit>, EngineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::Input("missing query".into()));
        }

        let strategies: Vec<Box<dyn Strategy<Vec<SearchHit>>>> = vec![
            Box::new(DuckDuckGoSearch {
                provisioner: Arc::clone(&self.provisioner),
                config: Arc::clone(&self.config),
                query: query.to_string(),
            }),
            Box::new(GoogleSearch {
                provisioner: Arc::clone(&self.provisioner),
                config: Arc::clone(&self.config),
                query: query.to_string(),
            }),
        ];

        let chain = fallback::run("reddit-search", strategies)
            .await
            .map_err(|e| exhausted("reddit-search", e))?;
        Ok(chain.payload)
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn page_target(&self, url: &str) -> Result<AcquisitionTarget, EngineError> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(EngineError::Input("missing url".into()));
        }
        let parsed = url::Url::parse(trimmed)
            .map_err(|e| EngineError::Input(format!("malformed url {trimmed:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(EngineError::Input(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }
        Ok(AcquisitionTarget::page(trimmed))
    }
}

/// Map a block verdict to the verification contract.
pub fn link_verdict(verdict: &BlockVerdict) -> LinkVerdict {
    let reason = match verdict {
        BlockVerdict::Clean => {
            return LinkVerdict {
                valid: true,
                reason: None,
            }
        }
        BlockVerdict::NotFound => "404 Title".to_string(),
        BlockVerdict::OffTargetRedirect { .. } => "Redirected outside domain".to_string(),
        BlockVerdict::Nsfw { .. } => "NSFW/Restricted Content".to_string(),
        BlockVerdict::EmptyBody => "Empty Body".to_string(),
        BlockVerdict::BotChallenge { .. } => "Bot challenge page".to_string(),
    };
    LinkVerdict {
        valid: false,
        reason: Some(reason),
    }
}

/// Gate a classified snapshot before extraction: a challenge becomes a
/// block report, an empty render fails as `ExtractionEmpty`.
pub fn extraction_gate(
    verdict: &BlockVerdict,
    snapshot: &PageSnapshot,
) -> Result<Option<BlockReport>, EngineError> {
    if matches!(verdict, BlockVerdict::EmptyBody) {
        return Err(EngineError::ExtractionEmpty);
    }
    Ok(block_report(verdict, snapshot))
}

/// A challenge verdict becomes a block report; everything else passes.
pub fn block_report(verdict: &BlockVerdict, snapshot: &PageSnapshot) -> Option<BlockReport> {
    match verdict {
        BlockVerdict::BotChallenge { trigger } => Some(BlockReport {
            block_type: "captcha".to_string(),
            trigger: trigger.clone(),
            title: snapshot.title.clone(),
        }),
        _ => None,
    }
}

/// Availability heuristic over visible text.
fn is_available(snapshot: &PageSnapshot, unavailable_phrases: &[String]) -> bool {
    let body = snapshot.visible_text.to_lowercase();
    !unavailable_phrases
        .iter()
        .any(|phrase| body.contains(phrase.as_str()))
}

fn exhausted(operation: &str, e: ChainExhausted) -> EngineError {
    EngineError::AllStrategiesFailed {
        operation: operation.to_string(),
        summary: e.summary(),
        attempts: e.attempts,
    }
}
