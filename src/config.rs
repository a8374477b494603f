//! Engine configuration.
//!
//! Built once at process start from the environment and passed into the
//! engine explicitly; there is no ambient mutable configuration state.
//! Trigger-phrase tables, selector tables, and settle bounds live here so
//! they can be tuned and tested without touching control flow.

use std::path::PathBuf;

use crate::detect::TriggerTables;
use crate::extract::SelectorTable;
use crate::settle::SettleConfig;
use crate::vision::VisionConfig;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Navigation/page-load timeout for scrape-class operations.
    pub nav_timeout_ms: u64,
    /// Tighter timeout for link verification.
    pub verify_timeout_ms: u64,
    /// Cap on concurrent browser sessions (one OS process each).
    pub max_sessions: usize,
    /// Byte cap on cleaned text returned to consumers.
    pub text_cap: usize,
    /// Byte cap on raw markup returned to consumers.
    pub markup_cap: usize,
    /// Fixed wait after loading a search-results page.
    pub search_wait_ms: u64,
    /// Block/challenge phrase tables.
    pub triggers: TriggerTables,
    /// Priority-ordered price selectors.
    pub price_selectors: SelectorTable,
    /// Body phrases meaning the listed product cannot be bought right now.
    pub unavailable_phrases: Vec<String>,
    /// Scroll/settle bounds.
    pub settle: SettleConfig,
    /// Vision collaborator; `None` means video insight reports skipped.
    pub vision: Option<VisionConfig>,
    /// Explicit Chromium binary path, if not discoverable.
    pub chromium_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nav_timeout_ms: 30_000,
            verify_timeout_ms: 15_000,
            max_sessions: 4,
            text_cap: 10_000,
            markup_cap: 200_000,
            search_wait_ms: 2_000,
            triggers: TriggerTables::default(),
            price_selectors: SelectorTable::price_defaults(),
            unavailable_phrases: vec![
                "currently unavailable".into(),
                "out of stock".into(),
                "sold out".into(),
            ],
            settle: SettleConfig::default(),
            vision: None,
            chromium_path: None,
        }
    }
}

impl EngineConfig {
    /// Read configuration from `SCOUT_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.nav_timeout_ms = env_u64("SCOUT_NAV_TIMEOUT_MS", config.nav_timeout_ms);
        config.verify_timeout_ms = env_u64("SCOUT_VERIFY_TIMEOUT_MS", config.verify_timeout_ms);
        config.max_sessions = env_u64("SCOUT_MAX_SESSIONS", config.max_sessions as u64) as usize;
        config.text_cap = env_u64("SCOUT_TEXT_CAP", config.text_cap as u64) as usize;
        config.markup_cap = env_u64("SCOUT_MARKUP_CAP", config.markup_cap as u64) as usize;

        if let Ok(path) = std::env::var("SCOUT_CHROMIUM_PATH") {
            if !path.is_empty() {
                config.chromium_path = Some(PathBuf::from(path));
            }
        }

        config.vision = VisionConfig::from_env();

        config
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let c = EngineConfig::default();
        assert!(c.max_sessions >= 1);
        assert!(c.text_cap > 0);
        assert!(c.verify_timeout_ms <= c.nav_timeout_ms);
        assert!(!c.price_selectors.selectors.is_empty());
        assert!(c.vision.is_none());
    }

    #[test]
    fn test_env_u64_falls_back_on_garbage() {
        std::env::set_var("SCOUT_TEST_GARBAGE", "not a number");
        assert_eq!(env_u64("SCOUT_TEST_GARBAGE", 7), 7);
        std::env::remove_var("SCOUT_TEST_GARBAGE");
    }
}
