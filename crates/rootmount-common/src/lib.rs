//! # rootmount-common
//!
//! Shared utilities and types for rootmount.
//!
//! This crate provides common functionality used across all rootmount crates:
//! - Common error types
//! - Standard filesystem paths
//! - Kernel device-name helpers

#![warn(missing_docs)]

pub mod device;
pub mod error;
pub mod paths;

pub use device::{DiskPartition, MountBy};
pub use error::{RootmountError, RootmountResult};
pub use paths::RootmountPaths;
