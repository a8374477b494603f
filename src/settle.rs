//! Dynamic-content settling.
//!
//! Drives a live session through a bounded scroll-and-wait sequence so
//! lazy-loaded content materializes before extraction. Increments and pauses
//! are randomized so the scroll cadence carries no uniform-timing
//! fingerprint. If the page grows while scrolling, the loop's upper bound
//! extends with it, up to hard step and distance ceilings that bound
//! worst-case latency against infinite-scroll pages.
//!
//! One settle run per session. Independent sessions settle in parallel.

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Bounds for one settle run.
#[derive(Debug, Clone)]
pub struct SettleConfig {
    /// Hard ceiling on scroll steps.
    pub max_steps: u32,
    /// Scroll increment range in pixels.
    pub min_step_px: u64,
    pub max_step_px: u64,
    /// Pause range between increments in milliseconds.
    pub min_pause_ms: u64,
    pub max_pause_ms: u64,
    /// Hard ceiling on total scroll distance in pixels.
    pub max_total_px: u64,
    /// Fixed pause after the last increment.
    pub final_settle_ms: u64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            max_steps: 40,
            min_step_px: 400,
            max_step_px: 900,
            min_pause_ms: 80,
            max_pause_ms: 260,
            max_total_px: 30_000,
            final_settle_ms: 2500,
        }
    }
}

/// The scrollable thing being settled. Abstracted so the loop is testable
/// without a browser.
#[async_trait]
pub trait ScrollSurface: Send + Sync {
    /// Current scrollable content height in pixels.
    async fn content_height(&self) -> Result<u64>;
    /// Move the scroll position to `y`.
    async fn scroll_to(&self, y: u64) -> Result<()>;
}

/// What a settle run did, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleOutcome {
    pub steps: u32,
    pub final_position: u64,
    /// The page grew while we scrolled and the bound was extended.
    pub extended: bool,
    /// A hard ceiling cut the run short.
    pub ceiling_hit: bool,
}

/// Run one settle sequence against a surface.
pub async fn settle(surface: &dyn ScrollSurface, cfg: &SettleConfig) -> Result<SettleOutcome> {
    let mut height = surface.content_height().await.unwrap_or(0);
    let mut position = 0u64;
    let mut steps = 0u32;
    let mut extended = false;
    let mut ceiling_hit = false;

    while position < height {
        if steps >= cfg.max_steps || position >= cfg.max_total_px {
            ceiling_hit = true;
            break;
        }

        // rand's thread-local generator is not held across awaits.
        let (step, pause) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(cfg.min_step_px..=cfg.max_step_px),
                rng.gen_range(cfg.min_pause_ms..=cfg.max_pause_ms),
            )
        };

        position = (position + step).min(cfg.max_total_px);
        surface.scroll_to(position).await?;
        steps += 1;
        tokio::time::sleep(Duration::from_millis(pause)).await;

        // Lazy loading may have grown the page; chase the new bound.
        let current = surface.content_height().await.unwrap_or(height);
        if current > height {
            extended = true;
            height = current;
        }
    }

    tokio::time::sleep(Duration::from_millis(cfg.final_settle_ms)).await;
    debug!("settle: {steps} steps, final position {position}, extended={extended}, ceiling={ceiling_hit}");

    Ok(SettleOutcome {
        steps,
        final_position: position,
        extended,
        ceiling_hit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Fake surface whose height follows a script of readings.
    struct FakeSurface {
        heights: Mutex<Vec<u64>>,
        last: AtomicU64,
        scrolls: AtomicU64,
    }

    impl FakeSurface {
        fn new(heights: Vec<u64>) -> Self {
            let last = *heights.first().unwrap_or(&0);
            Self {
                heights: Mutex::new(heights),
                last: AtomicU64::new(last),
                scrolls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl ScrollSurface for FakeSurface {
        async fn content_height(&self) -> Result<u64> {
            let mut heights = self.heights.lock().expect("lock poisoned");
            if !heights.is_empty() {
                let h = heights.remove(0);
                self.last.store(h, Ordering::SeqCst);
            }
            Ok(self.last.load(Ordering::SeqCst))
        }

        async fn scroll_to(&self, _y: u64) -> Result<()> {
            self.scrolls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fast_cfg() -> SettleConfig {
        SettleConfig {
            max_steps: 10,
            min_step_px: 500,
            max_step_px: 500,
            min_pause_ms: 0,
            max_pause_ms: 1,
            max_total_px: 100_000,
            final_settle_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_terminates_when_position_reaches_height() {
        let surface = FakeSurface::new(vec![1000]);
        let outcome = settle(&surface, &fast_cfg()).await.expect("settle ok");
        assert_eq!(outcome.steps, 2); // 500, 1000
        assert_eq!(outcome.final_position, 1000);
        assert!(!outcome.extended);
        assert!(!outcome.ceiling_hit);
    }

    #[tokio::test]
    async fn test_extends_bound_when_page_grows() {
        // Initial 1000; after the second step the page reports 2000.
        let surface = FakeSurface::new(vec![1000, 1000, 2000]);
        let outcome = settle(&surface, &fast_cfg()).await.expect("settle ok");
        assert!(outcome.extended);
        assert_eq!(outcome.final_position, 2000);
        assert_eq!(outcome.steps, 4);
    }

    #[tokio::test]
    async fn test_step_ceiling_bounds_infinite_scroll() {
        // Page always reports more content than we have scrolled.
        let surface = FakeSurface::new((0..100).map(|i| 10_000 + i * 1000).collect());
        let outcome = settle(&surface, &fast_cfg()).await.expect("settle ok");
        assert!(outcome.ceiling_hit);
        assert_eq!(outcome.steps, 10);
    }

    #[tokio::test]
    async fn test_distance_ceiling() {
        let mut cfg = fast_cfg();
        cfg.max_steps = 1000;
        cfg.max_total_px = 2000;
        let surface = FakeSurface::new(vec![50_000]);
        let outcome = settle(&surface, &cfg).await.expect("settle ok");
        assert!(outcome.ceiling_hit);
        assert_eq!(outcome.final_position, 2000);
    }

    #[tokio::test]
    async fn test_empty_page_settles_immediately() {
        let surface = FakeSurface::new(vec![0]);
        let outcome = settle(&surface, &fast_cfg()).await.expect("settle ok");
        assert_eq!(outcome.steps, 0);
        assert_eq!(surface.scrolls.load(Ordering::SeqCst), 0);
    }
}
