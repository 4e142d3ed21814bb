//! transplant-core
//!
//! Core library for migrating a C program to Rust one function at a time.
//!
//! Functions are visited callees-first, translated by a model, patched into a
//! hybrid C/Rust binary, and validated by rebuilding and re-running the
//! program's test suite. Failed attempts are rolled back so the workspace is
//! always buildable between functions.
//!
//! All substantive logic lives here so it is fully testable and reusable from
//! multiple frontends; the `transplant` CLI is a thin wrapper.

pub mod model;
pub mod analysis;
pub mod workspace;
pub mod services;
