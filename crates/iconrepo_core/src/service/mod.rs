//! Use-case services over the two stores.
//!
//! # Responsibility
//! - Order metadata and content-store steps so a write lands in both or in
//!   neither.
//! - Keep callers decoupled from SQL, git and queue details.

pub mod coordinator;

pub use coordinator::{CoordinatorError, CoordinatorResult, WriteCoordinator};
