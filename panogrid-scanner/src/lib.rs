pub mod cache;
pub mod crawler;
pub mod data;
pub mod document;
pub mod error;
pub mod fetch;
pub mod result;
pub mod store;
pub mod vendor;

pub use cache::FetchCache;
pub use crawler::{CrawlEvent, CrawlState, RegionCrawler};
pub use data::SqliteStore;
pub use document::{Document, DocumentFormat};
pub use error::ScanError;
pub use fetch::{Fetcher, HttpFetcher, MemoryFetcher, RetryPolicy};
pub use result::PanoResult;
pub use store::{DocumentStore, FsStore, MemoryStore};
pub use vendor::{Adapter, VendorKind};
