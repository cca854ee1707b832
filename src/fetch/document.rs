//! Queryable HTML documents
//!
//! `HtmlPage` owns the fetched body and the url it was served from. Parsing
//! happens on demand through `HtmlPage::parse`, which yields a `ParsedPage`
//! meant to be used synchronously and dropped before the next `.await`.

use crate::{Result, TidewatchError};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// A fetched HTML document
#[derive(Debug, Clone)]
pub struct HtmlPage {
    url: Url,
    body: String,
}

impl HtmlPage {
    pub fn new(url: Url, body: impl Into<String>) -> Self {
        Self {
            url,
            body: body.into(),
        }
    }

    /// Final url of the response, used to resolve relative links
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn parse(&self) -> ParsedPage<'_> {
        ParsedPage {
            page: self,
            html: Html::parse_document(&self.body),
        }
    }
}

/// Parsed view over an `HtmlPage`
pub struct ParsedPage<'a> {
    page: &'a HtmlPage,
    html: Html,
}

impl<'a> ParsedPage<'a> {
    pub fn html(&self) -> &Html {
        &self.html
    }

    pub fn exists(&self, selector: &str) -> Result<bool> {
        let selector = parse_selector(selector)?;
        Ok(self.html.select(&selector).next().is_some())
    }

    /// Trimmed text of every match, empty strings skipped
    pub fn select_texts(&self, selector: &str) -> Result<Vec<String>> {
        let selector = parse_selector(selector)?;
        Ok(self
            .html
            .select(&selector)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect())
    }

    pub fn select_text(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.select_texts(selector)?.into_iter().next())
    }

    /// Attribute values of every match carrying `attr`
    pub fn select_attrs(&self, selector: &str, attr: &str) -> Result<Vec<String>> {
        let selector = parse_selector(selector)?;
        Ok(self
            .html
            .select(&selector)
            .filter_map(|element| element.value().attr(attr))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect())
    }

    pub fn select_attr(&self, selector: &str, attr: &str) -> Result<Option<String>> {
        Ok(self.select_attrs(selector, attr)?.into_iter().next())
    }

    /// `href` of every match, resolved against the page url
    pub fn select_links(&self, selector: &str) -> Result<Vec<Url>> {
        Ok(self
            .select_attrs(selector, "href")?
            .iter()
            .filter_map(|href| resolve_link(self.page.url(), href))
            .collect())
    }
}

/// Compiles a CSS selector
pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|_| TidewatchError::Selector(selector.to_string()))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves an href against `base`, keeping http(s) targets only
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();

    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}
