//! HTTP fetch client
//!
//! This module handles every outbound request, including:
//! - Building the proxied and direct HTTP clients
//! - Desktop/mobile user agent selection per request
//! - Bounded retry on server errors (status > 500)
//! - Optional HTML and JSON decoding of 200 responses, or raw bytes
//!
//! Non-success statuses are returned as values. Only network level faults
//! (DNS, timeouts, refused connections) are errors.

use crate::config::HttpConfig;
use crate::fetch::document::HtmlPage;
use crate::fetch::retry::RetryPolicy;
use crate::{ConfigError, Result, TidewatchError};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Proxy, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Characters of a malformed JSON body kept in the log line
const BODY_EXCERPT_CHARS: usize = 256;

/// Which configured user agent a request presents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserAgentType {
    #[default]
    Desktop,
    Mobile,
}

/// Per-request options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub user_agent: UserAgentType,
    /// Bypass the configured proxy
    pub skip_proxy: bool,
    /// Total attempts while the server answers with status > 500
    pub retry_count: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            user_agent: UserAgentType::Desktop,
            skip_proxy: false,
            retry_count: 3,
        }
    }
}

impl FetchOptions {
    pub fn mobile(mut self) -> Self {
        self.user_agent = UserAgentType::Mobile;
        self
    }

    pub fn skip_proxy(mut self) -> Self {
        self.skip_proxy = true;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

/// Raw response of a GET
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final url after redirects
    pub url: String,
    pub status_code: u16,
    pub body: String,
}

/// Raw response of a GET whose body is kept as bytes
#[derive(Debug, Clone)]
pub struct BytesResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
}

/// Response whose body was parsed when the status was 200
#[derive(Debug, Clone)]
pub struct HtmlResponse {
    pub status_code: u16,
    pub body: String,
    pub page: Option<HtmlPage>,
}

/// Response whose body was decoded when the status was 200
#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub status_code: u16,
    pub data: Option<Value>,
}

/// HTTP client shared by the engines and the drivers
///
/// Cloning is cheap; both underlying reqwest clients are reference counted.
#[derive(Debug, Clone)]
pub struct FetchClient {
    proxied: Client,
    direct: Client,
    agents: Arc<Agents>,
}

#[derive(Debug)]
struct Agents {
    desktop: String,
    mobile: String,
}

impl FetchClient {
    /// Builds the client pair from the `[http]` configuration section
    ///
    /// # Arguments
    ///
    /// * `config` - The HTTP configuration
    ///
    /// # Returns
    ///
    /// * `Ok(FetchClient)` - Successfully built clients
    /// * `Err(TidewatchError)` - Invalid header value or proxy url
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let direct = build_http_client(config, None)?;
        let proxied = match config.proxy.as_deref() {
            Some(proxy) => build_http_client(config, Some(proxy))?,
            None => direct.clone(),
        };

        Ok(Self {
            proxied,
            direct,
            agents: Arc::new(Agents {
                desktop: config.desktop_user_agent.clone(),
                mobile: config.mobile_user_agent.clone(),
            }),
        })
    }

    /// GETs `url`, retrying while the status is above 500
    ///
    /// After `retry_count` attempts the last response is returned as is.
    pub async fn get(&self, url: &str, options: FetchOptions) -> Result<FetchResponse> {
        let response = self.send_with_retry(url, options).await?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(|source| TidewatchError::Http {
            url: url.to_string(),
            source,
        })?;

        Ok(FetchResponse {
            url: final_url,
            status_code,
            body,
        })
    }

    /// GETs `url` like `get`, keeping the body undecoded (images, archives)
    pub async fn get_bytes(&self, url: &str, options: FetchOptions) -> Result<BytesResponse> {
        let response = self.send_with_retry(url, options).await?;

        let status_code = response.status().as_u16();
        let body = response.bytes().await.map_err(|source| TidewatchError::Http {
            url: url.to_string(),
            source,
        })?;

        Ok(BytesResponse {
            status_code,
            body: body.to_vec(),
        })
    }

    async fn send_with_retry(&self, url: &str, options: FetchOptions) -> Result<Response> {
        let client = if options.skip_proxy {
            &self.direct
        } else {
            &self.proxied
        };
        let agent = match options.user_agent {
            UserAgentType::Desktop => self.agents.desktop.as_str(),
            UserAgentType::Mobile => self.agents.mobile.as_str(),
        };

        RetryPolicy::immediate(options.retry_count)
            .run(
                move |attempt| async move { send(client, url, agent, attempt).await },
                |response: &Response| response.status().as_u16() > 500,
            )
            .await
    }

    /// GETs `url` and parses the body into a queryable page on status 200
    pub async fn get_html(&self, url: &str, options: FetchOptions) -> Result<HtmlResponse> {
        let response = self.get(url, options).await?;

        let page = if response.status_code == 200 {
            let final_url = Url::parse(&response.url)?;
            Some(HtmlPage::new(final_url, response.body.clone()))
        } else {
            None
        };

        Ok(HtmlResponse {
            status_code: response.status_code,
            body: response.body,
            page,
        })
    }

    /// GETs `url` and decodes the body as JSON on status 200
    ///
    /// A body that is not valid JSON is a protocol error, distinct from
    /// transport failures; an excerpt of it is logged.
    pub async fn get_json(&self, url: &str, options: FetchOptions) -> Result<JsonResponse> {
        let response = self.get(url, options).await?;

        if response.status_code != 200 {
            return Ok(JsonResponse {
                status_code: response.status_code,
                data: None,
            });
        }

        match serde_json::from_str(&response.body) {
            Ok(data) => Ok(JsonResponse {
                status_code: response.status_code,
                data: Some(data),
            }),
            Err(source) => {
                tracing::warn!(
                    "Invalid JSON from {}: {}",
                    url,
                    excerpt(&response.body, BODY_EXCERPT_CHARS)
                );
                Err(TidewatchError::JsonParse {
                    url: url.to_string(),
                    source,
                })
            }
        }
    }
}

/// Builds an HTTP client with the shared headers and timeouts
fn build_http_client(config: &HttpConfig, proxy: Option<&str>) -> Result<Client> {
    let mut headers = HeaderMap::new();
    let language = HeaderValue::from_str(&config.accept_language).map_err(|_| {
        ConfigError::Validation(format!(
            "accept-language is not a valid header value: {}",
            config.accept_language
        ))
    })?;
    headers.insert(ACCEPT_LANGUAGE, language);

    let mut builder = Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true);

    builder = match proxy {
        Some(proxy) => builder.proxy(Proxy::all(proxy)?),
        None => builder.no_proxy(),
    };

    Ok(builder.build()?)
}

async fn send(client: &Client, url: &str, agent: &str, attempt: u32) -> Result<Response> {
    let response = client
        .get(url)
        .header(USER_AGENT, agent)
        .send()
        .await
        .map_err(|source| TidewatchError::Http {
            url: url.to_string(),
            source,
        })?;

    let status_code = response.status().as_u16();
    if status_code > 500 {
        tracing::warn!(
            "Server error {} for {} (attempt {})",
            status_code,
            url,
            attempt
        );
    } else {
        tracing::debug!("GET {} -> {}", url, status_code);
    }

    Ok(response)
}

fn excerpt(body: &str, max_chars: usize) -> String {
    let mut excerpt: String = body.chars().take(max_chars).collect();
    if body.chars().count() > max_chars {
        excerpt.push_str("...");
    }
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builders() {
        let options = FetchOptions::default()
            .mobile()
            .skip_proxy()
            .with_retry_count(5);
        assert_eq!(options.user_agent, UserAgentType::Mobile);
        assert!(options.skip_proxy);
        assert_eq!(options.retry_count, 5);
        assert_eq!(FetchOptions::default().retry_count, 3);
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        assert_eq!(excerpt("short", 10), "short");
        assert_eq!(excerpt("ñandú", 3), "ñan...");
    }

    #[test]
    fn test_invalid_proxy_is_rejected() {
        let config = HttpConfig {
            proxy: Some("::not a proxy::".to_string()),
            ..HttpConfig::default()
        };
        assert!(FetchClient::new(&config).is_err());
    }

    #[test]
    fn test_invalid_language_header() {
        let config = HttpConfig {
            accept_language: "es\nCO".to_string(),
            ..HttpConfig::default()
        };
        assert!(matches!(
            FetchClient::new(&config),
            Err(TidewatchError::Config(_))
        ));
    }
}
