// Library exports for alncache
pub mod aliases;
pub mod alignment;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod counts;
pub mod downsample;
pub mod error;
pub mod events;
pub mod hts_source;
pub mod interval;
pub mod pack;
pub mod range;
pub mod sort;
pub mod source;
pub mod splice;
pub mod worker;

pub use coordinator::{LoadCoordinator, LoadStatus};
pub use error::{LoadError, Result};
pub use range::{GenomicRange, Viewport, ViewportId};
