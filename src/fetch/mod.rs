//! Fetch layer
//!
//! This module handles all HTTP requests, including:
//! - The retrying `FetchClient` with proxied and direct transports
//! - `HtmlPage`, a fetched document that is parsed on demand
//! - `RetryPolicy`, the single retry abstraction used by every engine

mod client;
mod document;
mod retry;

pub use client::{
    BytesResponse, FetchClient, FetchOptions, FetchResponse, HtmlResponse, JsonResponse,
    UserAgentType,
};
pub use document::{parse_selector, resolve_link, HtmlPage, ParsedPage};
pub use retry::{is_server_error, Backoff, RetryPolicy};
