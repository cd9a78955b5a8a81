mod fetcher_impls;
pub mod fetcher_traits;
mod scan_jobs;
pub mod store;
mod tracker;

pub use scan_jobs::*;
