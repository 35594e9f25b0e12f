//! sake-core ☢
//! ========
//!
//! The sake build engine: preprocessing, pattern expansion, graph
//! construction, scheduling, execution and the fingerprint store.
//! Decoupled from the CLI in `sake`.

#![forbid(unsafe_code)]

pub mod audit;
pub mod exec;
pub mod expand;
pub mod graph;
pub mod preprocess;
pub mod schedule;
pub mod store;

pub use audit::parse_and_audit;
pub use exec::{build, clean};
pub use expand::expand_sakefile;
pub use graph::{build_graph, Graph, TargetName, TiesMap};
pub use preprocess::{preprocess, ExpandedSource};
pub use schedule::{Selection, Settings, StaleReason, StalenessDecision};
