//! Extraction engine
//!
//! Re-fetches the items selected by a filter, page by page and strictly one
//! item at a time. Each item draws its transport retries and refetch requests
//! from a single attempt budget.

use crate::archive::Archiver;
use crate::config::ExtractionConfig;
use crate::discovery::DiscoveryService;
use crate::drivers::DriverRegistry;
use crate::extract::url_builder::TemplateUrlBuilder;
use crate::extract::{ExtractedContent, Extractor, UrlBuilder};
use crate::explore::ItemLink;
use crate::fetch::{is_server_error, FetchClient, FetchOptions, HtmlPage, RetryPolicy};
use crate::model::{
    diff, keys, timestamp, Filter, HistoryEntry, Item, Network, QualifiedKey, RunStatistics,
};
use crate::storage::{with_storage, SharedStorage};
use crate::{Result, TidewatchError};
use chrono::Utc;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// Raw document file name inside a snapshot archive
const SNAPSHOT_DOCUMENT: &str = "document.html";
const SNAPSHOT_METADATA: &str = "metadata.json";

/// Runs extractor drivers over filtered items
pub struct ExtractionEngine {
    storage: SharedStorage,
    client: FetchClient,
    registry: Arc<DriverRegistry>,
    archiver: Archiver,
    config: ExtractionConfig,
}

/// Everything resolved once per run
struct Run<'a> {
    filter: &'a Filter,
    network: &'a Network,
    extractor: &'a dyn Extractor,
    discovery: DiscoveryService,
}

impl ExtractionEngine {
    pub fn new(
        storage: SharedStorage,
        client: FetchClient,
        registry: Arc<DriverRegistry>,
        archiver: Archiver,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            storage,
            client,
            registry,
            archiver,
            config,
        }
    }

    /// Extracts every item matched by the filter at `network:filter`
    ///
    /// The invocation is audited as an execution record, closed with the
    /// statistics and the error text when the run fails.
    pub async fn extract(&self, filter_path: &str) -> Result<RunStatistics> {
        let key = QualifiedKey::parse(filter_path)?;

        let filter = with_storage(&self.storage, |storage| {
            storage.get_filter(&key.network, &key.key)
        })?
        .ok_or_else(|| TidewatchError::FilterNotFound(key.to_string()))?;

        let network = with_storage(&self.storage, |storage| {
            storage.get_network(&filter.network_key)
        })?
        .ok_or_else(|| TidewatchError::NetworkNotFound(filter.network_key.clone()))?;

        let extractor = self
            .registry
            .extractor(&network.key, network.extractor_key())?;

        let execution_id = with_storage(&self.storage, |storage| {
            storage.start_execution(
                &json!({ "command": "extract", "filter": key.to_string() }),
                Utc::now(),
            )
        })?;

        let run = Run {
            filter: &filter,
            network: &network,
            extractor: extractor.as_ref(),
            discovery: DiscoveryService::new(self.storage.clone(), network.key.clone()),
        };

        tracing::info!("Starting extraction {}", key);
        let mut stats = RunStatistics::new();
        let outcome = self.process(&run, &mut stats).await;

        let error = outcome.as_ref().err().map(|e| e.to_string());
        let result = serde_json::to_value(stats.snapshot())?;
        let finished = with_storage(&self.storage, |storage| {
            storage.finish_execution(execution_id, error.as_deref(), &result, Utc::now())
        });

        match outcome {
            Ok(()) => {
                finished?;
                tracing::info!("Extraction {} completed: {:?}", key, stats.snapshot());
                Ok(stats)
            }
            Err(e) => {
                if let Err(finish_error) = finished {
                    tracing::error!("Unable to record failed extraction {}: {}", key, finish_error);
                }
                tracing::error!("Extraction {} failed: {}", key, e);
                Err(e)
            }
        }
    }

    /// Processes the items the filter selects when the run starts
    ///
    /// The selection is captured up front so that items leaving the filter
    /// while being processed do not shift later pages. Items discovered
    /// during the run are left for the next one.
    async fn process(&self, run: &Run<'_>, stats: &mut RunStatistics) -> Result<()> {
        let page_size = run
            .network
            .extract_page_size()
            .unwrap_or(self.config.default_page_size)
            .max(1) as usize;

        let identifiers = with_storage(&self.storage, |storage| {
            storage.find_item_identifiers(run.filter, Utc::now())
        })?;
        tracing::info!("{} items selected", identifiers.len());

        for (page, chunk) in identifiers.chunks(page_size).enumerate() {
            let items = with_storage(&self.storage, |storage| storage.get_items(chunk))?;
            tracing::debug!("Processing page {} ({} items)", page + 1, items.len());

            for item in &items {
                self.process_item(run, item, stats).await?;
            }
        }

        Ok(())
    }

    async fn process_item(
        &self,
        run: &Run<'_>,
        item: &Item,
        stats: &mut RunStatistics,
    ) -> Result<()> {
        stats.increase(keys::ITEMS_PROCESSED);

        let url = self.resolve_url(run, item)?;
        let policy = RetryPolicy::fixed(self.config.max_item_attempts, self.config.retry_delay());
        let budget = policy.attempts();
        // Item level retries replace the client's own
        let options = FetchOptions::default().with_retry_count(1);

        let mut attempt = 1;
        loop {
            match self.client.get_html(&url, options).await {
                Ok(response) if response.status_code == 200 => {
                    let page = response.page.ok_or_else(|| TidewatchError::HtmlParse {
                        url: url.clone(),
                        message: "200 response without a document".to_string(),
                    })?;

                    match run.extractor.extract(&page, run.network)? {
                        ExtractedContent::Refetch => {
                            if attempt >= budget {
                                return Err(TidewatchError::RefetchExhausted {
                                    identifier: item.identifier.clone(),
                                    attempts: attempt,
                                });
                            }
                            tracing::info!("Refetch requested for {}", item.label());
                        }
                        ExtractedContent::Failed { error } => {
                            tracing::warn!("Extraction error for {}: {}", item.label(), error);
                            with_storage(&self.storage, |storage| {
                                storage.mark_item_error(&item.identifier, &error, Utc::now())
                            })?;
                            stats.increase(keys::ITEMS_ERRORED);
                            return Ok(());
                        }
                        ExtractedContent::Data {
                            data,
                            item_links,
                            assets,
                        } => {
                            return self
                                .apply(run, item, data, &item_links, &assets, &page, stats)
                                .await;
                        }
                    }
                }
                Ok(response) if response.status_code == 404 => {
                    tracing::info!("Item {} was removed", item.label());
                    with_storage(&self.storage, |storage| {
                        storage.mark_item_removed(&item.identifier, Utc::now())
                    })?;
                    stats.increase(keys::ITEMS_REMOVED);
                    return Ok(());
                }
                Ok(response) if is_server_error(response.status_code) => {
                    tracing::warn!(
                        "Server error {} for {} (attempt {}/{})",
                        response.status_code,
                        item.label(),
                        attempt,
                        budget
                    );
                }
                Ok(response) => {
                    return Err(TidewatchError::UnexpectedStatus {
                        url,
                        status: response.status_code,
                    });
                }
                Err(e) if e.is_transport() => {
                    tracing::warn!(
                        "Transport error for {} (attempt {}/{}): {}",
                        item.label(),
                        attempt,
                        budget,
                        e
                    );
                }
                Err(e) => return Err(e),
            }

            if attempt >= budget {
                tracing::warn!(
                    "Skipping {} after {} failed attempts",
                    item.label(),
                    attempt
                );
                stats.increase(keys::ITEMS_SKIPPED);
                return Ok(());
            }

            policy.wait_after(attempt).await;
            attempt += 1;
        }
    }

    /// Url of an item: stored url, driver builder, then the network template
    fn resolve_url(&self, run: &Run<'_>, item: &Item) -> Result<String> {
        if let Some(url) = &item.url {
            return Ok(url.clone());
        }

        let external_id =
            item.external_id
                .as_deref()
                .ok_or_else(|| TidewatchError::UnaddressableItem {
                    identifier: item.identifier.clone(),
                })?;

        match run.extractor.url_builder() {
            Some(builder) => builder.build_url(external_id, run.network),
            None => TemplateUrlBuilder.build_url(external_id, run.network),
        }
    }

    /// Records extracted data: links, diff, history, then the snapshot
    #[allow(clippy::too_many_arguments)]
    async fn apply(
        &self,
        run: &Run<'_>,
        item: &Item,
        data: Value,
        item_links: &[ItemLink],
        assets: &[String],
        page: &HtmlPage,
        stats: &mut RunStatistics,
    ) -> Result<()> {
        for link in item_links {
            run.discovery
                .discover(link.url.as_deref(), link.external_id.as_deref())?;
        }

        let previous = item.data.clone().unwrap_or_else(|| json!({}));
        let changes = diff(&previous, &data);
        let now = Utc::now();

        if changes.is_empty() {
            tracing::debug!("No changes for {}", item.label());
            stats.increase(keys::ITEMS_UNCHANGED);
        } else {
            // The first extraction is not a change
            let history = item.data.as_ref().map(|_| HistoryEntry {
                date: now,
                changeset: changes,
            });
            with_storage(&self.storage, |storage| {
                storage.update_item_data(&item.identifier, &data, history.as_ref(), now)
            })?;
            tracing::info!("Updated {}", item.label());
            stats.increase(keys::ITEMS_UPDATED);
        }

        let downloaded = self.download_assets(item, assets, stats).await;

        let metadata = serde_json::to_vec_pretty(&json!({
            "identifier": item.identifier,
            "url": page.url().as_str(),
            "fetchedAt": timestamp(now),
            "assets": assets,
        }))?;
        let mut files: Vec<(&str, &[u8])> = vec![
            (SNAPSHOT_DOCUMENT, page.body().as_bytes()),
            (SNAPSHOT_METADATA, metadata.as_slice()),
        ];
        files.extend(
            downloaded
                .iter()
                .map(|(name, body)| (name.as_str(), body.as_slice())),
        );

        let logical_path = format!("{}/history/{}", run.network.key, item.identifier);
        self.archiver.archive_snapshot(&files, &logical_path)?;
        stats.increase(keys::SNAPSHOTS_SAVED);

        Ok(())
    }

    /// Fetches snapshot assets as `img_<n>.<ext>`, numbered from 1 in order
    ///
    /// An asset that can not be fetched is logged and left out.
    async fn download_assets(
        &self,
        item: &Item,
        assets: &[String],
        stats: &mut RunStatistics,
    ) -> Vec<(String, Vec<u8>)> {
        let mut files = Vec::new();

        for (index, asset) in assets.iter().enumerate() {
            match self.client.get_bytes(asset, FetchOptions::default()).await {
                Ok(response) if response.status_code == 200 => {
                    files.push((asset_file_name(index + 1, asset), response.body));
                    stats.increase(keys::ASSETS_SAVED);
                }
                Ok(response) => {
                    tracing::warn!(
                        "Asset {} of {} answered {}",
                        asset,
                        item.label(),
                        response.status_code
                    );
                    stats.increase(keys::ASSETS_FAILED);
                }
                Err(e) => {
                    tracing::warn!("Unable to download asset {} of {}: {}", asset, item.label(), e);
                    stats.increase(keys::ASSETS_FAILED);
                }
            }
        }

        files
    }
}

fn asset_file_name(index: usize, url: &str) -> String {
    let extension = Url::parse(url).ok().and_then(|url| {
        Path::new(url.path())
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    });

    match extension {
        Some(ext) => format!("img_{}.{}", index, ext),
        None => format!("img_{}", index),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_file_name_keeps_extension() {
        assert_eq!(
            asset_file_name(1, "https://img.example.com/photos/A.JPG?size=large"),
            "img_1.jpg"
        );
        assert_eq!(asset_file_name(3, "https://img.example.com/raw/blob"), "img_3");
        assert_eq!(asset_file_name(2, "not a url"), "img_2");
    }
}
