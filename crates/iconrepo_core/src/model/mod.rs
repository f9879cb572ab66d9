//! Domain model for icons and their binary renditions.
//!
//! # Responsibility
//! - Define the records exchanged between the coordinator, the metadata
//!   store and the content store.
//! - Validate every value that later becomes a content-store path component.
//!
//! # Invariants
//! - An icon is identified by its immutable `name`.
//! - An iconfile is identified by `(format, size)` within its icon.

pub mod icon;
