//! Acquisition targets and page snapshots.
//!
//! A [`PageSnapshot`] is the immutable result of one navigation: final URL,
//! title, raw markup, and derived visible text. It is captured from a live
//! session at one point in time and never mutated afterwards.

use serde::{Deserialize, Serialize};

/// What kind of surface an acquisition points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    Page,
    Video,
    SearchQuery,
}

/// Immutable input to one acquisition operation.
#[derive(Debug, Clone)]
pub struct AcquisitionTarget {
    pub kind: TargetKind,
    /// URL, video id, or search query depending on `kind`.
    pub locator: String,
}

impl AcquisitionTarget {
    pub fn page(url: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Page,
            locator: url.into(),
        }
    }

    pub fn video(id: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Video,
            locator: id.into(),
        }
    }

    pub fn search(query: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::SearchQuery,
            locator: query.into(),
        }
    }

    /// Registrable domain of the target locator, if it is a URL.
    pub fn domain(&self) -> Option<String> {
        domain_of(&self.locator)
    }
}

/// Immutable result of one navigation.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    /// URL after all redirects.
    pub final_url: String,
    /// Document title.
    pub title: String,
    /// Full outer HTML at capture time.
    pub raw_markup: String,
    /// Text with non-content subtrees (script, style, nav, ...) removed.
    pub visible_text: String,
}

impl PageSnapshot {
    /// Domain of the final URL, if parseable.
    pub fn domain(&self) -> Option<String> {
        domain_of(&self.final_url)
    }
}

/// Extract the host of a URL with any leading `www.` stripped.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_ascii_lowercase())
}
