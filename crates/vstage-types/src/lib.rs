//! Foundation types for vstage.
//!
//! This crate provides the identity and path types shared by every other
//! vstage crate.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Identifier of the versioned object a stage targets
//! - [`VersionNum`] -- 1-based version number (`v1`, `v2`, ...)
//! - [`path`] -- Logical path validation and joining

pub mod error;
pub mod object;
pub mod path;

pub use error::TypeError;
pub use object::{ObjectId, VersionNum};
pub use path::{
    ancestors, is_root, is_under, join_logical, validate_logical_dir, validate_logical_path,
};
