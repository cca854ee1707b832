//! Brand/model catalog explorer
//!
//! Enumerates brands, then each brand's models, from a JSON filter endpoint
//! shaped like `{"available_filters": [{"id": "BRAND", "values": [{"id": ..}]}]}`
//! and walks the listing of every brand/model pair. Both lists are cached for
//! a week. A `{brand, model}` checkpoint is saved before each walk.
//!
//! Options:
//! - `brandsUrl`: filter endpoint listing brands
//! - `modelsUrlTemplate`: filter endpoint listing models, `$brand` substituted
//! - `listingUrlTemplate`: first result page, `$brand` and `$model` substituted
//! - every `ListingPattern` option

use crate::explore::{traverse, ExplorationContext, Explorer, ListingPattern};
use crate::fetch::FetchOptions;
use crate::model::{keys, Options};
use crate::{Result, TidewatchError};
use async_trait::async_trait;
use serde_json::{json, Value};

const CATALOG_TTL_HOURS: i64 = 24 * 7;
const BRANDS_CACHE_KEY: &str = "brands";
const BRAND_FILTER: &str = "BRAND";
const MODEL_FILTER: &str = "MODEL";

pub struct CatalogExplorer;

struct CatalogSettings {
    brands_url: String,
    models_url_template: String,
    listing_url_template: String,
}

impl CatalogSettings {
    fn from_options(options: &Options) -> Result<Self> {
        let required = |key: &str| {
            options
                .get_str(key)
                .map(str::to_string)
                .ok_or_else(|| TidewatchError::Driver(format!("{} is not configured", key)))
        };

        Ok(Self {
            brands_url: required("brandsUrl")?,
            models_url_template: required("modelsUrlTemplate")?,
            listing_url_template: required("listingUrlTemplate")?,
        })
    }

    fn models_url(&self, brand: &str) -> String {
        self.models_url_template.replace("$brand", brand)
    }

    fn listing_url(&self, brand: &str, model: &str) -> String {
        self.listing_url_template
            .replace("$brand", brand)
            .replace("$model", model)
    }
}

/// Position to resume from; the model is optional
#[derive(Debug, Clone, PartialEq, Eq)]
struct Checkpoint {
    brand: String,
    model: Option<String>,
}

impl Checkpoint {
    fn from_state(state: &Value) -> Option<Self> {
        Some(Self {
            brand: state.get("brand").and_then(id_string)?,
            model: state.get("model").and_then(id_string),
        })
    }
}

#[async_trait]
impl Explorer for CatalogExplorer {
    async fn explore(&self, ctx: &mut ExplorationContext) -> Result<()> {
        let settings = CatalogSettings::from_options(ctx.options())?;
        let pattern = ListingPattern::from_options(ctx.options())?;
        let resume = ctx.resume_state().and_then(Checkpoint::from_state);

        let mut brands =
            cached_filter_ids(ctx, BRANDS_CACHE_KEY, &settings.brands_url, BRAND_FILTER).await?;
        if let Some(checkpoint) = &resume {
            skip_before(&mut brands, &checkpoint.brand);
            if let Some(first) = brands.first() {
                tracing::info!("Starting at brand {}", first);
            }
        }

        for brand in brands {
            let cache_key = format!("brand@{}_models", brand);
            let mut models =
                cached_filter_ids(ctx, &cache_key, &settings.models_url(&brand), MODEL_FILTER)
                    .await?;

            if let Some(model) = resume
                .as_ref()
                .filter(|checkpoint| checkpoint.brand == brand)
                .and_then(|checkpoint| checkpoint.model.as_deref())
            {
                skip_before(&mut models, model);
                if let Some(first) = models.first() {
                    tracing::info!("Starting at model {}", first);
                }
            }

            for model in models {
                ctx.save_state_vars(json!({ "brand": brand, "model": model }))?;
                // Each listing gets its own strike budget
                ctx.stats_mut().reset(keys::REPEAT_STRIKE);

                let url = settings.listing_url(&brand, &model);
                let outcome = traverse(ctx, &url, &pattern).await?;
                tracing::debug!("Brand {} model {}: {:?}", brand, model, outcome);
            }
        }

        Ok(())
    }
}

/// Drops the entries before `start`; a missing `start` keeps everything
fn skip_before(ids: &mut Vec<String>, start: &str) {
    match ids.iter().position(|id| id == start) {
        Some(index) => {
            ids.drain(..index);
        }
        None => tracing::warn!("Checkpoint {} not found, starting from the beginning", start),
    }
}

async fn cached_filter_ids(
    ctx: &mut ExplorationContext,
    cache_key: &str,
    url: &str,
    filter_id: &str,
) -> Result<Vec<String>> {
    if let Some(ids) = ctx.get_cached_as::<Vec<String>>(cache_key, CATALOG_TTL_HOURS) {
        tracing::info!("Getting {} from cache", cache_key);
        return Ok(ids);
    }

    tracing::info!("Fetching {} ids from {}", filter_id, url);
    let response = ctx.client().get_json(url, FetchOptions::default()).await?;
    let data = response.data.ok_or_else(|| TidewatchError::UnexpectedStatus {
        url: url.to_string(),
        status: response.status_code,
    })?;

    let mut ids = filter_ids(&data, filter_id)?;
    ids.sort();
    ctx.cache_value(cache_key, json!(ids))?;
    Ok(ids)
}

/// `values[].id` of the filter named `filter_id`
fn filter_ids(data: &Value, filter_id: &str) -> Result<Vec<String>> {
    let filters = data
        .get("available_filters")
        .and_then(Value::as_array)
        .ok_or_else(|| TidewatchError::Driver("available_filters is missing".to_string()))?;

    let values = filters
        .iter()
        .find(|filter| filter.get("id").and_then(Value::as_str) == Some(filter_id))
        .and_then(|filter| filter.get("values"))
        .and_then(Value::as_array);

    match values {
        Some(values) => Ok(values
            .iter()
            .filter_map(|value| value.get("id").and_then(id_string))
            .collect()),
        None => {
            tracing::warn!("Empty filter list {}", filter_id);
            Ok(Vec::new())
        }
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
