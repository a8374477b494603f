//! Block/challenge classification over a page snapshot.
//!
//! Pure function of a [`PageSnapshot`] plus the original target, no I/O.
//! Phrase sets live in a versioned [`TriggerTables`] so they can be tuned
//! and unit-tested without touching control flow.
//!
//! Decision order, first match wins: explicit not-found beats explicit
//! challenge beats redirect beats content gating beats the coarse empty-body
//! check. A block page is often non-empty, so the specific signals must win.

use crate::snapshot::{AcquisitionTarget, PageSnapshot};
use serde::Serialize;

/// Classification of one rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum BlockVerdict {
    Clean,
    NotFound,
    BotChallenge {
        trigger: String,
    },
    OffTargetRedirect {
        from_domain: String,
        to_domain: String,
    },
    Nsfw {
        trigger: String,
    },
    EmptyBody,
}

/// Phrase sets and thresholds that drive classification.
///
/// The defaults are the tables observed to work against marketplace and
/// social targets; bump `version` whenever an entry changes.
#[derive(Debug, Clone)]
pub struct TriggerTables {
    pub version: u32,
    /// Title phrases meaning the page itself reports "not found".
    pub not_found_titles: Vec<String>,
    /// Title/body phrases meaning an automated-access challenge.
    pub bot_challenge: Vec<String>,
    /// Marketplace phrases that are innocuous on a full page but indicate a
    /// challenge interstitial when the body is suspiciously short.
    pub marketplace_soft: Vec<String>,
    /// Body length below which `marketplace_soft` phrases count as triggers.
    pub marketplace_soft_max_body: usize,
    /// Body phrases meaning an age/content gate.
    pub nsfw: Vec<String>,
    /// Domains where a redirect off-domain invalidates the fetch.
    pub strict_identity_domains: Vec<String>,
    /// Body text shorter than this (after trimming) counts as empty.
    pub min_body_len: usize,
}

impl Default for TriggerTables {
    fn default() -> Self {
        Self {
            version: 1,
            not_found_titles: vec!["404".into(), "page not found".into()],
            bot_challenge: vec![
                "robot check".into(),
                "captcha".into(),
                "access denied".into(),
                "security challenge".into(),
                "automated access".into(),
                "verify you are a human".into(),
            ],
            marketplace_soft: vec![
                "continue shopping".into(),
                "click the button below to continue shopping".into(),
                "conditions of use".into(),
            ],
            marketplace_soft_max_body: 1500,
            nsfw: vec![
                "over 18".into(),
                "adult content".into(),
                "nsfw".into(),
                "click to enter".into(),
                "mature content".into(),
            ],
            strict_identity_domains: vec!["reddit.com".into()],
            min_body_len: 1,
        }
    }
}

impl TriggerTables {
    /// First phrase from `set` found in `haystack`, if any.
    fn first_hit<'a>(haystack: &str, set: &'a [String]) -> Option<&'a str> {
        set.iter()
            .find(|phrase| haystack.contains(phrase.as_str()))
            .map(|s| s.as_str())
    }
}

/// Classify a snapshot against the original target.
pub fn classify(
    tables: &TriggerTables,
    snapshot: &PageSnapshot,
    target: &AcquisitionTarget,
) -> BlockVerdict {
    let title = snapshot.title.to_lowercase();
    let body = snapshot.visible_text.trim().to_lowercase();

    // 1. Explicit not-found title.
    if TriggerTables::first_hit(&title, &tables.not_found_titles).is_some() {
        return BlockVerdict::NotFound;
    }

    // 2. Challenge phrases in title or body, plus the marketplace heuristic:
    //    soft phrases only count when the body is suspiciously short.
    if let Some(trigger) = TriggerTables::first_hit(&title, &tables.bot_challenge)
        .or_else(|| TriggerTables::first_hit(&body, &tables.bot_challenge))
    {
        return BlockVerdict::BotChallenge {
            trigger: trigger.to_string(),
        };
    }
    if body.len() < tables.marketplace_soft_max_body {
        if let Some(trigger) = TriggerTables::first_hit(&body, &tables.marketplace_soft) {
            return BlockVerdict::BotChallenge {
                trigger: trigger.to_string(),
            };
        }
    }

    // 3. Redirect off a strict-identity domain. Any host under the same
    //    identity domain is on-target (old.reddit.com -> www.reddit.com).
    if let (Some(from), Some(to)) = (target.domain(), snapshot.domain()) {
        let strict = tables
            .strict_identity_domains
            .iter()
            .find(|d| from == d.as_str() || from.ends_with(&format!(".{d}")));
        if let Some(identity) = strict {
            let on_target = to == identity.as_str() || to.ends_with(&format!(".{identity}"));
            if !on_target {
                return BlockVerdict::OffTargetRedirect {
                    from_domain: from,
                    to_domain: to,
                };
            }
        }
    }

    // 4. Age/content gate.
    if let Some(trigger) = TriggerTables::first_hit(&body, &tables.nsfw) {
        return BlockVerdict::Nsfw {
            trigger: trigger.to_string(),
        };
    }

    // 5. Nothing rendered.
    if body.len() < tables.min_body_len {
        return BlockVerdict::EmptyBody;
    }

    BlockVerdict::Clean
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(final_url: &str, title: &str, body: &str) -> PageSnapshot {
        PageSnapshot {
            final_url: final_url.to_string(),
            title: title.to_string(),
            raw_markup: format!("<html><body>{body}</body></html>"),
            visible_text: body.to_string(),
        }
    }

    fn page(url: &str) -> AcquisitionTarget {
        AcquisitionTarget::page(url)
    }

    #[test]
    fn test_not_found_title_any_case() {
        let tables = TriggerTables::default();
        let s = snap("https://example.com/x", "404 Not Found", "plenty of body text here");
        assert_eq!(
            classify(&tables, &s, &page("https://example.com/x")),
            BlockVerdict::NotFound
        );
        let s = snap("https://example.com/x", "Oops — Page Not Found", "body");
        assert_eq!(
            classify(&tables, &s, &page("https://example.com/x")),
            BlockVerdict::NotFound
        );
    }

    #[test]
    fn test_not_found_preempts_challenge_phrase_in_body() {
        let tables = TriggerTables::default();
        let s = snap(
            "https://example.com/x",
            "Page not found",
            "please solve this captcha to continue",
        );
        assert_eq!(
            classify(&tables, &s, &page("https://example.com/x")),
            BlockVerdict::NotFound
        );
    }

    #[test]
    fn test_robot_check_title_is_challenge() {
        let tables = TriggerTables::default();
        let s = snap("https://amazon.com/dp/B0", "Robot Check", "type the characters you see");
        match classify(&tables, &s, &page("https://amazon.com/dp/B0")) {
            BlockVerdict::BotChallenge { trigger } => assert_eq!(trigger, "robot check"),
            other => panic!("expected BotChallenge, got {other:?}"),
        }
    }

    #[test]
    fn test_marketplace_soft_phrase_only_triggers_on_short_body() {
        let tables = TriggerTables::default();

        let short = snap(
            "https://amazon.com/dp/B0",
            "Amazon.com",
            "Click the button below to continue shopping.",
        );
        assert!(matches!(
            classify(&tables, &short, &page("https://amazon.com/dp/B0")),
            BlockVerdict::BotChallenge { .. }
        ));

        // A legitimate long product page may mention "continue shopping".
        let long_body = format!(
            "Continue shopping. {}",
            "Great product with many reviews. ".repeat(100)
        );
        let long = snap("https://amazon.com/dp/B0", "Amazon.com", &long_body);
        assert_eq!(
            classify(&tables, &long, &page("https://amazon.com/dp/B0")),
            BlockVerdict::Clean
        );
    }

    #[test]
    fn test_off_target_redirect_for_strict_identity_domain() {
        let tables = TriggerTables::default();
        let s = snap("https://spamsite.example/win", "A prize", "you won, click here to claim it");
        match classify(&tables, &s, &page("https://reddit.com/r/a/comments/b")) {
            BlockVerdict::OffTargetRedirect {
                from_domain,
                to_domain,
            } => {
                assert_eq!(from_domain, "reddit.com");
                assert_eq!(to_domain, "spamsite.example");
            }
            other => panic!("expected OffTargetRedirect, got {other:?}"),
        }
    }

    #[test]
    fn test_same_domain_is_not_a_redirect() {
        let tables = TriggerTables::default();
        let s = snap(
            "https://www.reddit.com/r/a/comments/b",
            "Thread",
            "a perfectly ordinary comment thread with discussion",
        );
        assert_eq!(
            classify(&tables, &s, &page("https://reddit.com/r/a/comments/b")),
            BlockVerdict::Clean
        );
    }

    #[test]
    fn test_sibling_subdomain_is_on_target() {
        let tables = TriggerTables::default();
        // old.reddit.com landing on www.reddit.com shares the identity
        // domain; that is not an off-target redirect.
        let s = snap(
            "https://www.reddit.com/r/a/comments/b",
            "Thread",
            "a perfectly ordinary comment thread with discussion",
        );
        assert_eq!(
            classify(&tables, &s, &page("https://old.reddit.com/r/a/comments/b")),
            BlockVerdict::Clean
        );
    }

    #[test]
    fn test_nsfw_gate() {
        let tables = TriggerTables::default();
        let s = snap(
            "https://example.com/x",
            "Welcome",
            "you must be over 18 to view this community",
        );
        assert!(matches!(
            classify(&tables, &s, &page("https://example.com/x")),
            BlockVerdict::Nsfw { .. }
        ));
    }

    #[test]
    fn test_empty_body_with_unrecognized_title() {
        let tables = TriggerTables::default();
        let s = snap("https://example.com/x", "Loading…", "   ");
        assert_eq!(
            classify(&tables, &s, &page("https://example.com/x")),
            BlockVerdict::EmptyBody
        );
    }

    #[test]
    fn test_clean_page() {
        let tables = TriggerTables::default();
        let s = snap(
            "https://example.com/x",
            "Example Domain",
            "this domain is for use in illustrative examples in documents",
        );
        assert_eq!(
            classify(&tables, &s, &page("https://example.com/x")),
            BlockVerdict::Clean
        );
    }
}
