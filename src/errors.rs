//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`Error`] covers the recoverable failure modes:
//! - Asset acquisition failures (I/O, unresolved companion resources)
//! - Bundle and glTF decoding errors
//! - Native engine object creation failures
//! - Load cancellation
//! - Rejected scene graph changes
//!
//! Programmer errors (calling GPU-mutating APIs off the render thread, using a
//! disposed resource, out-of-range submesh indices) are not represented here:
//! they panic at the call site.
//!
//! # Usage
//!
//! All fallible APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, Error>`.
//!
//! Load results are delivered through shared futures to every awaiter of the
//! same resource id, so [`Error`] is `Clone`; I/O errors are held behind an
//! [`Arc`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Pipeline stage in which a load request was when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStage {
    Requested,
    Downloading,
    Parsing,
    TextureLoading,
    MaterialBinding,
    GpuUpload,
    Ready,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Requested => "requested",
            Self::Downloading => "downloading",
            Self::Parsing => "parsing",
            Self::TextureLoading => "texture loading",
            Self::MaterialBinding => "material binding",
            Self::GpuUpload => "gpu upload",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// The main error type for the crate.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ========================================================================
    // Source & I/O Errors
    // ========================================================================
    /// A builder was finalized without any source.
    #[error("Renderable builder has no source: {0}")]
    MissingSource(String),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// A companion resource of an asset could not be resolved or fetched.
    #[error("Unresolved resource '{uri}': {reason}")]
    UnresolvedResource {
        /// The URI as written in the parent asset
        uri: String,
        /// Why resolution failed
        reason: String,
    },

    // ========================================================================
    // Format & Parsing Errors
    // ========================================================================
    /// Structurally invalid bundle data.
    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    /// The bundle declares a format version this crate cannot read.
    #[error("Unsupported bundle version {found_major}.{found_minor} (supported major: {supported_major})")]
    UnsupportedVersion {
        found_major: u16,
        found_minor: u16,
        supported_major: u16,
    },

    /// A material parameter uses an init tag this crate does not know.
    #[error("Unsupported material parameter type tag {tag} for '{name}'")]
    UnsupportedParameterType { name: String, tag: u8 },

    /// Image decoding error.
    #[error("Image decode error: {0}")]
    ImageDecode(String),

    /// glTF parsing or loading error.
    #[error("glTF error: {0}")]
    Gltf(String),

    /// A load failed inside a specific pipeline stage.
    #[error("Load failed during {stage}: {message}")]
    LoadFailed { stage: LoadStage, message: String },

    // ========================================================================
    // Scene Graph Errors
    // ========================================================================
    /// A hierarchy change would break the tree (self-parenting, cycles,
    /// unknown nodes).
    #[error("Invalid hierarchy change: {0}")]
    InvalidHierarchy(String),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The load was cancelled (registry teardown or dropped render thread).
    #[error("Load cancelled: {0}")]
    Cancelled(String),

    /// The native engine refused to create an object.
    #[error("Native engine error: {0}")]
    Native(String),

    /// Settings could not be parsed.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl Error {
    /// Wraps this error with the stage it surfaced in, unless it already
    /// carries a more specific classification.
    #[must_use]
    pub fn in_stage(self, stage: LoadStage) -> Self {
        match self {
            Self::Io(e) => Self::LoadFailed {
                stage,
                message: e.to_string(),
            },
            other => other,
        }
    }
}

// ============================================================================
// Convenient conversion implementations
// ============================================================================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::ImageDecode(err.to_string())
    }
}

#[cfg(feature = "gltf")]
impl From<gltf::Error> for Error {
    fn from(err: gltf::Error) -> Self {
        Error::Gltf(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Error::Cancelled(err.to_string())
        } else {
            Error::LoadFailed {
                stage: LoadStage::Parsing,
                message: err.to_string(),
            }
        }
    }
}

impl From<futures::channel::oneshot::Canceled> for Error {
    fn from(_: futures::channel::oneshot::Canceled) -> Self {
        Error::Cancelled("render thread dropped the task".to_string())
    }
}

/// Alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
