pub mod cache;
pub mod pool;

pub use cache::{CacheCounters, PageRasterCache, RasterEntry};
pub use pool::{PageJob, RasterJobDone, RasterPool};
