//! These modules expose the internal workings of `sake`'s CLI. They are
//! currently not stable, and therefore have no associated `SemVer`. As
//! such, any function contained within may be subject to change.

#![forbid(unsafe_code)]

/// Argument parsing
pub mod args;
/// Bootstrapping: Sakefile discovery/loading, help listing, target
/// resolution, `visual` DOT export
pub mod cli;
