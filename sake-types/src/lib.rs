//! sake-types ☢
//! ========
//!
//! Serializable data model for sake: the parsed Sakefile, its targets, and
//! the on-disk fingerprint store format. No filesystem or graph logic lives
//! here — that's `sake-core`.

#![forbid(unsafe_code)]

mod error;
mod sakefile;
mod store;
mod target;

pub use error::{SakeError, SakeResult};
pub use sakefile::Sakefile;
pub use store::{FileFingerprint, FingerprintStoreDocument};
pub use target::{MetaTarget, SakefileEntry, Target};

/// Current sake version, embedded in every `.shastore` document written and
/// checked against on load (see `sake_core::store::load`).
pub const SAKE_VERSION: &str = env!("CARGO_PKG_VERSION");
