//! The tools node (§4.7): a short-lived helper container used for
//! host-from-container IP discovery, plus the first-pull-wins image cache
//! that replaces a process-global pull mutex.

pub mod error;
pub mod host_address;
pub mod image_cache;

pub use error::ToolsError;
pub use host_address::discover;
pub use image_cache::ImagePullCache;
