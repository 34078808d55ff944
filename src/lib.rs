//! # Devbox
//!
//! Provision isolated development boxes by running setup commands inside
//! them, concurrently where it is safe to do so.
//!
//! ## Usage
//!
//! ```bash
//! devbox setup <box> [--file setup.txt] [--quiet] [commands...]
//! devbox packages <box>
//! ```
//!
//! ## Modules
//!
//! - `parallel` - Worker pool, command classification, grouped setup execution and package queries
//! - `provision` - Setup with sequential fallback and timed package inventory
//! - `sandbox` - The command-runner seam and its `docker exec` implementation
//! - `subprocess` - Unified subprocess abstraction layer for testing
//! - `testing` - Scripted in-memory command runner for tests
pub mod parallel;
pub mod provision;
pub mod sandbox;
pub mod subprocess;
pub mod testing;
