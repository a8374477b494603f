//! Capability search for community discussion threads.
//!
//! Performs a "headless manual search" against a general search surface
//! restricted to reddit.com, acting as a human user would. DuckDuckGo is
//! primary (it serves headless clients without a challenge far more often);
//! Google is the fallback strategy when DuckDuckGo yields zero qualifying
//! results. Qualifying means a same-domain comment-thread URL shape.
//!
//! Each strategy provisions and releases its own browser session.

use anyhow::{bail, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::EngineConfig;
use crate::fallback::Strategy;
use crate::session::SessionProvisioner;
use crate::snapshot::domain_of;

/// Results are bounded; the consumer wants leads, not a crawl frontier.
pub const MAX_RESULTS: usize = 5;

/// One qualifying search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
}

/// A comment-thread URL: reddit host, `/r/<sub>/comments/<id>` shape.
pub fn is_comment_thread(url: &str) -> bool {
    let Some(domain) = domain_of(url) else {
        return false;
    };
    if domain != "reddit.com" && !domain.ends_with(".reddit.com") {
        return false;
    }
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    let path = parsed.path();
    path.contains("/r/") && path.contains("/comments/")
}

/// Unwrap Google's `/url?q=<target>&...` redirect wrapper; other hrefs pass
/// through unchanged.
pub fn unwrap_redirect(href: &str) -> Option<String> {
    let Some(query) = href.strip_prefix("/url?") else {
        return Some(href.to_string());
    };
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "q")
        .map(|(_, v)| v.into_owned())
}

fn push_unique(hits: &mut Vec<SearchHit>, hit: SearchHit) {
    if hits.len() < MAX_RESULTS && !hits.iter().any(|h| h.url == hit.url) {
        hits.push(hit);
    }
}

/// Parse DuckDuckGo's result anchors out of rendered markup.
pub fn parse_duckduckgo_results(html: &str) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(r#"a[data-testid="result-title-a"]"#) else {
        return Vec::new();
    };

    let mut hits = Vec::new();
    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !is_comment_thread(href) {
            continue;
        }
        let title = anchor.text().collect::<String>().trim().to_string();
        push_unique(
            &mut hits,
            SearchHit {
                title,
                url: href.to_string(),
            },
        );
        if hits.len() >= MAX_RESULTS {
            break;
        }
    }
    hits
}

/// Parse qualifying thread links out of a Google results page. Google wraps
/// many hrefs in redirects and gives anchors no stable test ids, so this
/// scans every anchor and filters by URL shape.
pub fn parse_google_results(html: &str) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut hits = Vec::new();
    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(target) = unwrap_redirect(href) else {
            continue;
        };
        if !is_comment_thread(&target) {
            continue;
        }
        let text = anchor.text().collect::<String>().trim().to_string();
        let title = if text.is_empty() {
            "Reddit Thread".to_string()
        } else {
            text
        };
        push_unique(&mut hits, SearchHit { title, url: target });
        if hits.len() >= MAX_RESULTS {
            break;
        }
    }
    hits
}

fn encoded(query: &str) -> String {
    url::form_urlencoded::byte_serialize(query.as_bytes()).collect()
}

/// Navigate, let result scripts run, return the rendered markup. The
/// session is released before this returns, success or failure.
async fn fetch_results_markup(
    provisioner: &SessionProvisioner,
    url: &str,
    wait_ms: u64,
) -> Result<String> {
    let mut session = provisioner
        .acquire()
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let outcome = async {
        session.navigate(url).await?;
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        let snapshot = session.snapshot().await?;
        Ok(snapshot.raw_markup)
    }
    .await;

    session.release().await;
    outcome
}

/// Primary search strategy.
pub struct DuckDuckGoSearch {
    pub provisioner: Arc<SessionProvisioner>,
    pub config: Arc<EngineConfig>,
    pub query: String,
}

#[async_trait]
impl Strategy<Vec<SearchHit>> for DuckDuckGoSearch {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn attempt(&self) -> Result<Vec<SearchHit>> {
        let url = format!(
            "https://duckduckgo.com/?q=site%3Areddit.com+{}&t=h_&ia=web",
            encoded(&self.query)
        );
        let markup =
            fetch_results_markup(&self.provisioner, &url, self.config.search_wait_ms).await?;
        let hits = parse_duckduckgo_results(&markup);
        debug!("duckduckgo: {} qualifying results", hits.len());
        if hits.is_empty() {
            bail!("no qualifying results");
        }
        Ok(hits)
    }
}

/// Fallback search strategy.
pub struct GoogleSearch {
    pub provisioner: Arc<SessionProvisioner>,
    pub config: Arc<EngineConfig>,
    pub query: String,
}

#[async_trait]
impl Strategy<Vec<SearchHit>> for GoogleSearch {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn attempt(&self) -> Result<Vec<SearchHit>> {
        let url = format!(
            "https://www.google.com/search?q=site:reddit.com+{}",
            encoded(&self.query)
        );
        let markup =
            fetch_results_markup(&self.provisioner, &url, self.config.search_wait_ms).await?;
        let hits = parse_google_results(&markup);
        debug!("google: {} qualifying results", hits.len());
        if hits.is_empty() {
            bail!("no qualifying results");
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_thread_shape() {
        assert!(is_comment_thread(
            "https://www.reddit.com/r/headphones/comments/abc123/best_budget"
        ));
        assert!(is_comment_thread(
            "https://old.reddit.com/r/buyitforlife/comments/xyz/"
        ));
        assert!(!is_comment_thread("https://www.reddit.com/r/headphones/"));
        assert!(!is_comment_thread(
            "https://notreddit.example/r/x/comments/y"
        ));
        assert!(!is_comment_thread("https://evilreddit.com/r/x/comments/y"));
        assert!(!is_comment_thread("not a url"));
    }

    #[test]
    fn test_unwrap_google_redirect() {
        assert_eq!(
            unwrap_redirect(
                "/url?q=https://www.reddit.com/r/a/comments/b/&sa=U&ved=x"
            )
            .as_deref(),
            Some("https://www.reddit.com/r/a/comments/b/")
        );
        assert_eq!(
            unwrap_redirect("https://direct.example/page").as_deref(),
            Some("https://direct.example/page")
        );
        assert!(unwrap_redirect("/url?sa=U&ved=x").is_none());
    }

    #[test]
    fn test_parse_duckduckgo_filters_and_bounds() {
        let mut anchors = String::new();
        for i in 0..8 {
            anchors.push_str(&format!(
                r#"<a data-testid="result-title-a" href="https://www.reddit.com/r/s/comments/t{i}/">Thread {i}</a>"#
            ));
        }
        anchors.push_str(
            r#"<a data-testid="result-title-a" href="https://blog.example/post">Off-site</a>"#,
        );
        let html = format!("<html><body>{anchors}</body></html>");

        let hits = parse_duckduckgo_results(&html);
        assert_eq!(hits.len(), MAX_RESULTS);
        assert_eq!(hits[0].title, "Thread 0");
        assert!(hits.iter().all(|h| is_comment_thread(&h.url)));
    }

    #[test]
    fn test_parse_google_unwraps_redirects_and_dedupes() {
        let html = r#"<html><body>
            <a href="/url?q=https://www.reddit.com/r/a/comments/b/&sa=U">First thread</a>
            <a href="/url?q=https://www.reddit.com/r/a/comments/b/&sa=U">First thread again</a>
            <a href="https://www.reddit.com/r/c/comments/d/"></a>
            <a href="/url?q=https://spamsite.example/&sa=U">Spam</a>
        </body></html>"#;

        let hits = parse_google_results(html);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "First thread");
        assert_eq!(hits[1].title, "Reddit Thread");
    }
}
