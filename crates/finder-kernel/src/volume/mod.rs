//! Volumes: the storage backends the connector dispatches to.

mod error;
pub mod memory;
pub mod mime;
mod ops;
mod types;

pub use error::{VolumeError, VolumeResult};
pub use memory::{MemoryDriver, MemoryVolume};
pub use ops::{Driver, Volume};
pub use types::{FileStream, ResizeMode, ResizeRequest, UploadFile};
