//! Stealth posture for browser sessions.
//!
//! User-agent and viewport are drawn from rotation pools per session, and an
//! init script clears the automation tells a challenge script checks first.

use rand::seq::SliceRandom;
use rand::Rng;

/// Desktop Chrome user-agents rotated across sessions.
pub const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

/// Common desktop viewport sizes. Each gets a small random jitter so two
/// sessions rarely share exact dimensions.
pub const VIEWPORT_POOL: &[(u32, u32)] = &[(1366, 768), (1440, 900), (1536, 864), (1920, 1080)];

/// Installed before any page script runs. Challenge scripts probe
/// `navigator.webdriver` and the plugin/language surface first.
pub const INIT_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3] });
window.chrome = window.chrome || { runtime: {} };
"#;

/// Per-session stealth parameters.
#[derive(Debug, Clone)]
pub struct StealthProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
}

impl StealthProfile {
    /// Draw a randomized profile from the rotation pools.
    pub fn randomized() -> Self {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENT_POOL
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENT_POOL[0])
            .to_string();
        let (w, h) = *VIEWPORT_POOL.choose(&mut rng).unwrap_or(&VIEWPORT_POOL[0]);
        let viewport = (w + rng.gen_range(0..16), h + rng.gen_range(0..16));
        Self {
            user_agent,
            viewport,
        }
    }
}
