//! Container conversion and the operator around it
//!
//! `convert` and `key_match` are pure; `reader`, `writer` and `runner`
//! handle files, prompts and status output.

pub mod convert;
pub mod key_match;
pub mod reader;
pub mod runner;
pub mod writer;

pub use convert::{convert, ArtifactRole, CredentialBundle, PemArtifact};
pub use reader::DetectedFormat;
