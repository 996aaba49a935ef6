//! # stubweld-core
//!
//! Method body rewriting for compiled modules.
//!
//! A subject module declares placeholder ("stub") methods whose bodies only
//! throw. This crate loads the subject together with the read-only modules of
//! a host framework, resolves the host symbols each stub stands in for, and
//! replaces every stub body with a call into the host:
//! - scalar arguments are forwarded unchanged
//! - (pointer, length) wrappers are rebuilt as the host's own wrapper type
//! - object references are turned into native pointers
//!
//! ## Pipeline
//!
//! Loader → Resolver → {Struct translation, Pointer resolution} →
//! Synthesizer → Pruner → Writer. [`Patcher`] runs all of it.
//!
//! ## Failure model
//!
//! Missing host modules and a missing wrapper pair abort the run before any
//! output is written. Any other symbol that cannot be resolved only skips the
//! stub that needs it; see [`PatchReport`].

pub mod config;
pub mod container;
pub mod emit;
pub mod error;
pub mod host;
pub mod il;
pub mod import;
pub mod loader;
pub mod metadata;
pub mod patcher;
pub mod prune;
pub mod resolve;
pub mod stub;
pub mod writer;

pub use config::PatchConfig;
// Re-export commonly used types
pub use error::{PatchError, PatchResult};
pub use patcher::Patcher;
pub use stub::{PatchReport, StubState};
