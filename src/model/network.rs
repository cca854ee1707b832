use crate::model::options::Options;
use serde::{Deserialize, Serialize};

/// A site whose listings are explored and extracted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub key: String,
    #[serde(default)]
    pub configuration: Option<NetworkConfiguration>,
}

/// Optional network level settings
///
/// Keys the engines do not know about stay available to drivers via `options`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfiguration {
    /// Url template for items stored without a url; `$externalId` is substituted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_template: Option<String>,

    /// Items processed per extraction page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_page_size: Option<u32>,

    /// Extractor driver key, `default` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor: Option<String>,

    #[serde(flatten)]
    pub options: Options,
}

impl Network {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            configuration: None,
        }
    }

    pub fn url_template(&self) -> Option<&str> {
        self.configuration
            .as_ref()
            .and_then(|c| c.url_template.as_deref())
    }

    pub fn extract_page_size(&self) -> Option<u32> {
        self.configuration.as_ref().and_then(|c| c.extract_page_size)
    }

    pub fn extractor_key(&self) -> &str {
        self.configuration
            .as_ref()
            .and_then(|c| c.extractor.as_deref())
            .unwrap_or("default")
    }

    /// Driver options stored alongside the well-known keys
    pub fn options(&self) -> Options {
        self.configuration
            .as_ref()
            .map(|c| c.options.clone())
            .unwrap_or_default()
    }
}
