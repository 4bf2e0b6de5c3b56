//! HTTP fetch and extraction
//!
//! The concrete operation the binary plugs into the engine: fetch a URL and
//! pull configured text fields out of the returned HTML.

mod extract;
mod fetcher;

pub use extract::{compile_fields, extract, CompiledField, Extraction};
pub use fetcher::{build_http_client, HttpFetcher, PageContent};
