//! Result listing explorer
//!
//! Follows next-page links from a single start page and registers every item
//! link found on the way.
//!
//! Options:
//! - `baseUrl`: first result page
//! - every `ListingPattern` option

use crate::explore::{traverse, ExplorationContext, Explorer, ListingPattern};
use crate::{Result, TidewatchError};
use async_trait::async_trait;

/// Walks the result pages starting at the configured `baseUrl`
///
/// Serves both the `default` and `today` explorers; they differ only in the
/// url they are configured with.
pub struct ListingExplorer;

#[async_trait]
impl Explorer for ListingExplorer {
    async fn explore(&self, ctx: &mut ExplorationContext) -> Result<()> {
        let base_url = ctx
            .options()
            .get_str("baseUrl")
            .map(str::to_string)
            .ok_or_else(|| TidewatchError::Driver("baseUrl is not configured".to_string()))?;
        let pattern = ListingPattern::from_options(ctx.options())?;

        let outcome = traverse(ctx, &base_url, &pattern).await?;
        tracing::info!("Traversal from {} ended: {:?}", base_url, outcome);
        Ok(())
    }
}
