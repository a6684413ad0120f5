//! # finder-kernel
//!
//! Core of the finder connector: a command dispatcher in front of a
//! registry of hash-addressed volumes.
//!
//! A client never sees a backend path. Every node is addressed by an opaque
//! hash whose prefix names the owning volume (`m1_...`), so the dispatcher
//! can route any hash to its volume without knowing anything about the
//! backend behind it.
//!
//! - [`Connector`] validates commands, runs handlers, aggregates and filters
//!   results and builds the response envelope
//! - [`VolumeRegistry`] mounts roots through [`Driver`]s and resolves hashes
//! - [`Volume`] is the capability contract every backend implements
//! - [`MemoryVolume`] is the in-process backend (`Memory` / `Test` driver)

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod hash;
pub mod registry;
pub mod volume;

pub use commands::{ArgSpec, Command, is_valid, schema};
pub use config::{ConfigError, ConnectorConfig, Permissions, RootConfig};
pub use dispatch::{Connector, RequestState};
pub use events::{ConnectorEvent, EventBus, EventMessage, HasSubject, Subscription, matches_pattern};
pub use hash::{HashCodec, HashError, namespace_of};
pub use registry::{MountError, MountRecord, VolumeRegistry};
pub use volume::{
    Driver, FileStream, MemoryDriver, MemoryVolume, ResizeMode, ResizeRequest, UploadFile, Volume,
    VolumeError, VolumeResult,
};

pub use finder_types as types;
