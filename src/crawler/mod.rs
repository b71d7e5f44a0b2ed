//! Data-source discovery crawler
//!
//! Walks the configured domains breadth-and-priority-wise, classifies each
//! page, and registers discovered data sources for the download pipeline.

mod fetcher;
mod frontier;
mod parser;
mod session;

pub use fetcher::{needs_js_rendering, JsRenderer, PageFetcher};
pub use frontier::{CrawlTask, Frontier};
pub use parser::{parse_page, FeedLink, PageLink, ParsedPage};
pub use session::{CrawlSession, CrawlStats};
