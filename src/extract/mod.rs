//! Extraction
//!
//! This module re-fetches tracked items and records what changed, including:
//! - The `Extractor` driver capability and its optional `UrlBuilder`
//! - `ExtractionEngine`, the per-item fetch, extract, diff and snapshot loop

mod engine;
mod url_builder;

pub use engine::ExtractionEngine;
pub use url_builder::{TemplateUrlBuilder, UrlBuilder, EXTERNAL_ID_PLACEHOLDER};

use crate::explore::ItemLink;
use crate::fetch::HtmlPage;
use crate::model::Network;
use crate::Result;
use serde_json::Value;

/// What an extractor made of a fetched page
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedContent {
    /// The page is incomplete; fetch it again
    Refetch,
    /// The page is not a usable listing; recorded on the item
    Failed { error: String },
    Data {
        data: Value,
        /// Related items found on the page
        item_links: Vec<ItemLink>,
        /// Urls (images mostly) downloaded into the item's snapshot
        assets: Vec<String>,
    },
}

impl ExtractedContent {
    pub fn data(data: Value) -> Self {
        Self::Data {
            data,
            item_links: Vec::new(),
            assets: Vec::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }
}

/// Parses a fetched item page into structured data
///
/// Runs synchronously; returning `Err` aborts the whole extraction run and
/// is meant for driver misconfiguration, not for bad pages.
pub trait Extractor: Send + Sync {
    fn extract(&self, page: &HtmlPage, network: &Network) -> Result<ExtractedContent>;

    /// Custom url construction for items stored without a url
    fn url_builder(&self) -> Option<&dyn UrlBuilder> {
        None
    }
}
