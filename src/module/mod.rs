// src/module/mod.rs

//! Locally-defined modules.
//!
//! - [`params`] holds the parameter map and the recognised control flags.
//! - [`fingerprint`] computes the content hash used for duplicate detection.
//! - [`lifecycle`] owns a module instance and drives its state machine.
//! - [`builtin`] contains the module types shipped with `cascade`.

pub mod builtin;
pub mod fingerprint;
pub mod lifecycle;
pub mod params;

use serde_json::Value;

pub use fingerprint::fingerprint;
pub use lifecycle::{LocalModule, StatusCell};
pub use params::Parameters;

/// Capability interface every Local module implements.
///
/// The controller owns the parameters and status; hooks receive the
/// parameters mutably so a module may tune its own configuration while it
/// runs. Any error returned from a hook aborts the run and is reported to the
/// caller as [`crate::errors::CascadeError::HookFailure`].
pub trait Module: Send {
    /// Module type identifier (not unique across instances).
    fn basename(&self) -> &str;

    /// Fingerprint of the module implementation.
    fn code_version_hash(&self) -> &str;

    /// Parameters a fresh instance starts with.
    fn default_parameters(&self) -> Parameters {
        Parameters::new()
    }

    /// One-line human description.
    fn describe(&self) -> String {
        format!("an instance of {}", self.basename())
    }

    fn init(&mut self, params: &mut Parameters) -> anyhow::Result<()>;

    /// Do the work. The returned value becomes the module's result.
    fn execute(&mut self, params: &mut Parameters) -> anyhow::Result<Value>;

    fn finalize(&mut self, params: &mut Parameters) -> anyhow::Result<()>;
}

/// Static description of a module type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMetadata {
    pub name: String,
    pub version: String,
    pub summary: String,
    pub tags: Vec<String>,
}

/// Derive a code version hash from a module's source text.
///
/// Builtin modules pass `include_str!` of their own file so that editing the
/// implementation invalidates fingerprints recorded by older builds.
pub fn code_version_of(source: &str) -> String {
    let hash = blake3::hash(source.as_bytes()).to_hex();
    hash.as_str()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_version_is_stable_and_short() {
        let a = code_version_of("fn execute() {}");
        assert_eq!(a, code_version_of("fn execute() {}"));
        assert_ne!(a, code_version_of("fn execute() { todo() }"));
        assert_eq!(a.len(), 16);
    }
}
