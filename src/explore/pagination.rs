//! Result page traversal
//!
//! Walks a listing's result pages: every item link on a page is registered
//! through the context, then the "next page" link is followed while it matches
//! the allowed pattern and the repeat strike stays within its threshold.

use crate::explore::context::ExplorationContext;
use crate::fetch::{is_server_error, FetchOptions, HtmlPage, HtmlResponse};
use crate::model::{keys, Options};
use crate::{Result, TidewatchError};
use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// How a traversal ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraversalOutcome {
    /// The last page had no usable next link
    Exhausted,
    /// Consecutive known items exceeded the threshold
    RepeatStrike,
    /// `maxPages` result pages were visited
    PageLimit,
    /// A page could not be fetched after retries
    FetchFailed { url: String, status: Option<u16> },
}

/// A link found on a result page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemLink {
    /// Normalized url; `None` when an external id was extracted
    pub url: Option<String>,
    pub external_id: Option<String>,
}

/// Links found on one result page
#[derive(Debug, Clone, Default)]
pub struct PageScan {
    pub links: Vec<ItemLink>,
    pub next_page: Option<Url>,
}

/// Selectors and patterns describing a listing's result pages
#[derive(Debug, Clone)]
pub struct ListingPattern {
    pub item_selector: String,
    pub next_page_selector: Option<String>,
    /// Next links must match; without it they must stay on the same host
    pub next_page_allowed: Option<Regex>,
    /// Must contain a named group `id`
    pub external_id: Option<Regex>,
    /// Query parameters stripped from item links
    pub strip_params: Vec<String>,
    pub max_pages: Option<u64>,
}

impl ListingPattern {
    pub fn new(item_selector: impl Into<String>) -> Self {
        Self {
            item_selector: item_selector.into(),
            next_page_selector: None,
            next_page_allowed: None,
            external_id: None,
            strip_params: Vec::new(),
            max_pages: None,
        }
    }

    /// Reads the pattern from driver options
    ///
    /// Keys: `itemSelector` (required), `nextPageSelector`, `nextPageAllowed`,
    /// `externalIdPattern`, `stripParams`, `maxPages`.
    pub fn from_options(options: &Options) -> Result<Self> {
        let item_selector = options
            .get_str("itemSelector")
            .ok_or_else(|| TidewatchError::Driver("itemSelector is not configured".to_string()))?;

        let mut pattern = Self::new(item_selector);
        pattern.next_page_selector = options.get_str("nextPageSelector").map(str::to_string);
        pattern.next_page_allowed = options
            .get_str("nextPageAllowed")
            .map(compile_pattern)
            .transpose()?;
        pattern.external_id = options
            .get_str("externalIdPattern")
            .map(compile_pattern)
            .transpose()?;
        pattern.strip_params = options.get("stripParams").unwrap_or_default();
        pattern.max_pages = options.get("maxPages");

        if let Some(regex) = &pattern.external_id {
            if !regex.capture_names().any(|name| name == Some("id")) {
                return Err(TidewatchError::Driver(format!(
                    "externalIdPattern {} has no `id` group",
                    regex
                )));
            }
        }

        Ok(pattern)
    }

    /// Extracts item links and the next page link from a result page
    pub fn scan(&self, page: &HtmlPage) -> Result<PageScan> {
        let parsed = page.parse();
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for url in parsed.select_links(&self.item_selector)? {
            let normalized = normalize_link(url, &self.strip_params);
            if !seen.insert(normalized.clone()) {
                continue;
            }
            links.push(item_link(normalized, self.external_id.as_ref()));
        }

        let next_page = match &self.next_page_selector {
            Some(selector) => parsed.select_links(selector)?.into_iter().next(),
            None => None,
        };

        Ok(PageScan { links, next_page })
    }

    fn allows_next(&self, current: &Url, next: &Url) -> bool {
        match &self.next_page_allowed {
            Some(regex) => regex.is_match(next.as_str()),
            None => current.host_str() == next.host_str(),
        }
    }
}

/// Builds the link to register for `url`
///
/// When `external_id` yields an `id` group the url itself is dropped.
pub fn item_link(url: String, external_id: Option<&Regex>) -> ItemLink {
    let Some(regex) = external_id else {
        return ItemLink {
            url: Some(url),
            external_id: None,
        };
    };

    let id = regex
        .captures(&url)
        .and_then(|captures| captures.name("id"))
        .map(|id| id.as_str().to_string());

    match id {
        Some(id) => ItemLink {
            url: None,
            external_id: Some(id),
        },
        None => {
            tracing::warn!("Unable to extract external id from {}", url);
            ItemLink {
                url: Some(url),
                external_id: None,
            }
        }
    }
}

pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| TidewatchError::Driver(format!("Invalid pattern {}: {}", pattern, e)))
}

/// Strips the fragment and the given query parameters from a link
pub fn normalize_link(mut url: Url, strip_params: &[String]) -> String {
    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !strip_params.iter().any(|p| p == key))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    url.to_string()
}

/// Whether the traversal may fetch another page
///
/// Stops once the run's repeat strike exceeds the configured threshold.
pub fn continue_scrapping(ctx: &ExplorationContext) -> bool {
    let strike = ctx.stats().get(keys::REPEAT_STRIKE);
    let max = ctx.max_repeat_strike();
    if strike > max as i64 {
        tracing::info!("Repeat strike {} is above {}", strike, max);
        return false;
    }
    true
}

/// Walks result pages starting at `start_url`
///
/// Pages answering 5xx or failing at the transport level are retried with the
/// context's page policy; when attempts run out the traversal stops with
/// `FetchFailed` instead of failing the run.
pub async fn traverse(
    ctx: &mut ExplorationContext,
    start_url: &str,
    pattern: &ListingPattern,
) -> Result<TraversalOutcome> {
    let mut next = Some(start_url.to_string());
    let mut pages = 0u64;

    while let Some(url) = next.take() {
        tracing::debug!("Getting result page {}", url);
        let page = match fetch_page(ctx, &url).await? {
            Ok(page) => page,
            Err(status) => {
                tracing::error!("Unable to get page at {}, status: {:?}", url, status);
                return Ok(TraversalOutcome::FetchFailed { url, status });
            }
        };

        let scan = pattern.scan(&page)?;
        ctx.stats_mut().increase(keys::PAGES_VISITED);
        pages += 1;

        if scan.links.is_empty() {
            tracing::warn!("No items found at {}", url);
        }
        for link in &scan.links {
            ctx.add_item_link(link.url.as_deref(), link.external_id.as_deref())?;
        }

        let Some(next_page) = scan.next_page else {
            tracing::debug!("No next page link at {}", url);
            return Ok(TraversalOutcome::Exhausted);
        };
        if !pattern.allows_next(page.url(), &next_page) {
            tracing::info!("Next page link {} is not allowed, stopping", next_page);
            return Ok(TraversalOutcome::Exhausted);
        }
        if !continue_scrapping(ctx) {
            tracing::info!("Not scrapping next page {}", next_page);
            return Ok(TraversalOutcome::RepeatStrike);
        }
        if pattern.max_pages.is_some_and(|max| pages >= max) {
            return Ok(TraversalOutcome::PageLimit);
        }

        next = Some(next_page.to_string());
    }

    Ok(TraversalOutcome::Exhausted)
}

/// Outcome of one page attempt, transport faults included
enum PageAttempt {
    Response(HtmlResponse),
    Transport(TidewatchError),
}

impl PageAttempt {
    fn is_transient(&self) -> bool {
        match self {
            Self::Response(response) => is_server_error(response.status_code),
            Self::Transport(_) => true,
        }
    }
}

/// Fetches one result page; the inner `Err` carries the last status seen
async fn fetch_page(
    ctx: &ExplorationContext,
    url: &str,
) -> Result<std::result::Result<HtmlPage, Option<u16>>> {
    let client = ctx.client();
    // The page policy owns retries for result pages
    let options = FetchOptions::default().with_retry_count(1);

    let attempt = ctx
        .page_retry()
        .run(
            move |_| async move {
                Ok::<_, TidewatchError>(match client.get_html(url, options).await {
                    Ok(response) => PageAttempt::Response(response),
                    Err(e) if e.is_transport() => {
                        tracing::warn!("Transport error for {}: {}", url, e);
                        PageAttempt::Transport(e)
                    }
                    Err(e) => return Err(e),
                })
            },
            PageAttempt::is_transient,
        )
        .await?;

    Ok(match attempt {
        PageAttempt::Response(HtmlResponse {
            page: Some(page), ..
        }) => Ok(page),
        PageAttempt::Response(response) => Err(Some(response.status_code)),
        PageAttempt::Transport(_) => Err(None),
    })
}
