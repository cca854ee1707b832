//! CSS selector driven extractor
//!
//! Reads its rules from the network configuration:
//!
//! ```toml
//! [networks.configuration.fields]
//! title = { selector = "h1.title", required = true }
//! price = { selector = "meta[itemprop=price]", attr = "content" }
//! tags = { selector = ".tags li", multiple = true }
//! year = "span.year"
//! ```
//!
//! plus the optional `refetchSelector` (marks an incomplete page),
//! `itemLinkSelector`, `externalIdPattern`, `stripParams`, and `assetSelector`
//! with `assetAttr` (default `src`) naming the images kept in the snapshot.

use crate::explore::{item_link, normalize_link};
use crate::explore::pagination::compile_pattern;
use crate::extract::{ExtractedContent, Extractor};
use crate::fetch::{resolve_link, HtmlPage};
use crate::model::Network;
use crate::{Result, TidewatchError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub struct SelectorExtractor;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FieldSpec {
    Selector(String),
    Rule(FieldRule),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FieldRule {
    selector: String,
    #[serde(default)]
    attr: Option<String>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    multiple: bool,
}

impl FieldSpec {
    fn into_rule(self) -> FieldRule {
        match self {
            Self::Selector(selector) => FieldRule {
                selector,
                attr: None,
                required: false,
                multiple: false,
            },
            Self::Rule(rule) => rule,
        }
    }
}

impl Extractor for SelectorExtractor {
    fn extract(&self, page: &HtmlPage, network: &Network) -> Result<ExtractedContent> {
        let options = network.options();
        let fields: BTreeMap<String, FieldSpec> = options.get("fields").ok_or_else(|| {
            TidewatchError::Driver(format!(
                "fields are missing or malformed for network {}",
                network.key
            ))
        })?;

        let parsed = page.parse();

        if let Some(marker) = options.get_str("refetchSelector") {
            if parsed.exists(marker)? {
                return Ok(ExtractedContent::Refetch);
            }
        }

        let mut data = Map::new();
        for (name, spec) in fields {
            let rule = spec.into_rule();
            let mut values = match &rule.attr {
                Some(attr) => parsed.select_attrs(&rule.selector, attr)?,
                None => parsed.select_texts(&rule.selector)?,
            };

            if values.is_empty() {
                if rule.required {
                    return Ok(ExtractedContent::failed(format!(
                        "Required field {} not found",
                        name
                    )));
                }
                continue;
            }

            let value = if rule.multiple {
                Value::from(values)
            } else {
                Value::String(values.swap_remove(0))
            };
            data.insert(name, value);
        }

        let mut item_links = Vec::new();
        if let Some(selector) = options.get_str("itemLinkSelector") {
            let external_id = options
                .get_str("externalIdPattern")
                .map(compile_pattern)
                .transpose()?;
            let strip_params: Vec<String> = options.get("stripParams").unwrap_or_default();

            for url in parsed.select_links(selector)? {
                let link = item_link(normalize_link(url, &strip_params), external_id.as_ref());
                if !item_links.contains(&link) {
                    item_links.push(link);
                }
            }
        }

        let mut assets = Vec::new();
        if let Some(selector) = options.get_str("assetSelector") {
            let attr = options.get_str("assetAttr").unwrap_or("src");
            for value in parsed.select_attrs(selector, attr)? {
                if let Some(url) = resolve_link(page.url(), &value) {
                    let url = url.to_string();
                    if !assets.contains(&url) {
                        assets.push(url);
                    }
                }
            }
        }

        Ok(ExtractedContent::Data {
            data: Value::Object(data),
            item_links,
            assets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explore::ItemLink;
    use serde_json::json;
    use url::Url;

    fn network(configuration: Value) -> Network {
        serde_json::from_value(json!({"key": "tucarro", "configuration": configuration})).unwrap()
    }

    fn page(body: &str) -> HtmlPage {
        HtmlPage::new(Url::parse("https://cars.example.com/MCO-1-mazda").unwrap(), body)
    }

    #[test]
    fn test_extracts_configured_fields() {
        let network = network(json!({
            "fields": {
                "title": {"selector": "h1", "required": true},
                "price": {"selector": "meta[itemprop=price]", "attr": "content"},
                "tags": {"selector": ".tags li", "multiple": true},
                "year": "span.year",
                "color": "span.color"
            }
        }));
        let page = page(
            r#"<h1> Mazda 3 </h1><meta itemprop="price" content="9900">
               <ul class="tags"><li>sedan</li><li>manual</li></ul><span class="year">2019</span>"#,
        );

        let content = SelectorExtractor.extract(&page, &network).unwrap();
        assert_eq!(
            content,
            ExtractedContent::data(json!({
                "title": "Mazda 3",
                "price": "9900",
                "tags": ["sedan", "manual"],
                "year": "2019"
            }))
        );
    }

    #[test]
    fn test_assets_are_resolved_and_deduplicated() {
        let network = network(json!({
            "fields": {"title": "h1"},
            "assetSelector": "figure img",
            "assetAttr": "data-src"
        }));
        let page = page(
            r#"<h1>Mazda 3</h1><figure>
               <img data-src="/photos/1.jpg"><img data-src="/photos/1.jpg">
               <img data-src="https://img.example.com/2.webp"><img src="/ignored.png">
               </figure>"#,
        );

        let content = SelectorExtractor.extract(&page, &network).unwrap();
        let ExtractedContent::Data { assets, .. } = content else {
            panic!("expected data");
        };
        assert_eq!(
            assets,
            vec![
                "https://cars.example.com/photos/1.jpg".to_string(),
                "https://img.example.com/2.webp".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_required_field() {
        let network = network(json!({"fields": {"title": {"selector": "h1", "required": true}}}));
        let content = SelectorExtractor
            .extract(&page("<p>gone</p>"), &network)
            .unwrap();
        assert_eq!(
            content,
            ExtractedContent::failed("Required field title not found")
        );
    }

    #[test]
    fn test_refetch_marker() {
        let network = network(json!({
            "fields": {"title": "h1"},
            "refetchSelector": "#loading"
        }));
        let content = SelectorExtractor
            .extract(&page(r#"<div id="loading"></div>"#), &network)
            .unwrap();
        assert_eq!(content, ExtractedContent::Refetch);
    }

    #[test]
    fn test_item_links() {
        let network = network(json!({
            "fields": {"title": "h1"},
            "itemLinkSelector": "a.related",
            "externalIdPattern": r".*/(?P<id>MCO-[0-9]+)-.*"
        }));
        let content = SelectorExtractor
            .extract(
                &page(
                    r#"<h1>x</h1><a class="related" href="/MCO-2-kia#p=1">k</a>
                       <a class="related" href="/MCO-2-kia">k</a>
                       <a class="related" href="/about">about</a>"#,
                ),
                &network,
            )
            .unwrap();

        let ExtractedContent::Data { item_links, .. } = content else {
            panic!("expected data");
        };
        assert_eq!(
            item_links,
            vec![
                ItemLink {
                    url: None,
                    external_id: Some("MCO-2".to_string())
                },
                ItemLink {
                    url: Some("https://cars.example.com/about".to_string()),
                    external_id: None
                },
            ]
        );
    }

    #[test]
    fn test_missing_fields_configuration_is_fatal() {
        let result = SelectorExtractor.extract(&page("<h1>x</h1>"), &Network::new("tucarro"));
        assert!(matches!(result, Err(TidewatchError::Driver(_))));
    }
}
