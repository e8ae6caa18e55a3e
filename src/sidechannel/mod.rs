//! Cache side-channel measurement and exploitation primitives.

pub mod cache;
pub mod flush_reload;
pub mod spectre;

pub use cache::{analyze, audit, calibrate_threshold, CacheReport};
pub use flush_reload::{FlushReloadConfig, FlushReloadWatcher, WatchReport};
pub use spectre::{spectre_v1, IndexWidth, SpectreConfig, SpectreVariant};
