//! Manifest parsing, variable substitution, and image identity for exechub.
//!
//! This crate defines the schema layer: YAML executor manifests (`Manifest`)
//! with environment-variable substitution applied before validation, and the
//! `(namespace, name, version)` image identity every later stage keys on.

pub mod identity;
pub mod manifest;
pub mod substitute;
pub mod types;

pub use identity::{ImageIdentity, ImageReference, ReferenceError, DEFAULT_NAMESPACE};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, parse_manifest_str_with, validate_name, Manifest,
    ManifestError, MANIFEST_FILE,
};
pub use substitute::{substitute, substitute_env};
pub use types::{ContainerId, ImageDigest, ImageTag};
