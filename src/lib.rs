//! Storytime engine library.
//!
//! This module exposes the script runtime, the engine types scripts can use,
//! and the editor tooling generators for use in integration tests and by the
//! `storytime` binary.

pub mod components;
pub mod resources;
pub mod luarc_generator;
pub mod stub_generator;
