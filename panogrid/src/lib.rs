// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

pub mod crawl;

pub use crawl::{
    Backend, CrawlOptions, CrawlSummary, check_coverage, default_output_path, execute_crawl,
    open_store,
};
pub use handlers::{convert_point, expand_path, load_frame, parse_latlng, print_banner};
