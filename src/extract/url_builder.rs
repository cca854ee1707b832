use crate::model::Network;
use crate::{Result, TidewatchError};

/// Placeholder substituted by `TemplateUrlBuilder`
pub const EXTERNAL_ID_PLACEHOLDER: &str = "$externalId";

/// Builds the url of an item known only by its external id
pub trait UrlBuilder: Send + Sync {
    fn build_url(&self, external_id: &str, network: &Network) -> Result<String>;
}

/// Substitutes the external id into the network's `urlTemplate`
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateUrlBuilder;

impl UrlBuilder for TemplateUrlBuilder {
    fn build_url(&self, external_id: &str, network: &Network) -> Result<String> {
        let template = network
            .url_template()
            .ok_or_else(|| TidewatchError::MissingUrlTemplate(network.key.clone()))?;
        Ok(template.replace(EXTERNAL_ID_PLACEHOLDER, external_id))
    }
}
