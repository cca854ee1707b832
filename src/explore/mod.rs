//! Exploration
//!
//! This module discovers new items, including:
//! - The `Explorer` driver capability
//! - `ExplorationContext`, the per-run cache, counters and checkpoint
//! - `ExplorationEngine`, the run state machine around a driver
//! - The result page traversal shared by listing drivers

mod context;
mod engine;
pub mod pagination;

pub use context::{ExplorationContext, DEFAULT_CACHE_TTL_HOURS, MAX_REPEAT_STRIKE_KEY};
pub use engine::{ExplorationEngine, RunPhase};
pub use pagination::{
    continue_scrapping, item_link, normalize_link, traverse, ItemLink, ListingPattern,
    TraversalOutcome,
};

use crate::Result;
use async_trait::async_trait;

/// Discovers item links for a network
///
/// Errors fail the run; the engine records them and never retries.
#[async_trait]
pub trait Explorer: Send + Sync {
    async fn explore(&self, ctx: &mut ExplorationContext) -> Result<()>;
}
