pub mod assignment;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod optimizer;
pub mod pairs;
pub mod scoring;
pub mod service;
pub mod stats;
pub mod store;
pub mod suggestions;

pub use error::{OptimizeError, Result};
pub use optimizer::LineupOptimizer;
pub use service::{LineupService, OptimizeRequest};
