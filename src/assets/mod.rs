//! Asset acquisition and lifetime
//!
//! - [`io`]: byte readers behind every URI the crate opens
//! - [`uri`]: companion resource resolution
//! - [`registry`]: per-type caches that deduplicate concurrent loads
//! - [`cleanup`]: deferred destruction of native objects
//! - [`holder`]: teardown of every registry at once
//! - [`loaders`]: bundle and glTF pipelines

pub mod cleanup;
pub mod holder;
pub mod io;
pub mod loaders;
pub mod registry;
pub mod uri;

pub use cleanup::{CleanupRegistry, CleanupToken};
pub use holder::{ResourceHolder, ResourceManager};
pub use io::{AssetReader, FileAssetReader, MemoryAssetReader};
pub use loaders::LoadRequest;
pub use registry::{ResourceRegistry, SharedLoad};
