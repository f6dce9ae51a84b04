pub mod aggregator;
pub mod ardor;
pub mod cache_warmer;
pub mod polygon;

pub use aggregator::AggregationService;
pub use cache_warmer::CacheWarmer;
