//! Command-line argument parsing, via `clap`'s derive API.

use clap::Parser;
use std::path::PathBuf;

/// `sake [options] [target ...]` — build the named targets, or every root
/// when none are given. `help`, `clean` and `visual` are reserved target
/// names that trigger the corresponding action instead of a build.
#[derive(Parser, Debug)]
#[command(name = "sake", about, version)]
pub struct Args {
    /// Print the plan without executing any formula
    #[arg(short = 'r', long = "recon")]
    pub recon: bool,

    /// Schedule and run each level's stale targets in parallel
    #[arg(short = 'p', long = "parallel")]
    pub parallel: bool,

    /// Treat every target in the effective DAG as stale
    #[arg(short = 'F', long = "force")]
    pub force: bool,

    /// Suppress formula stdout; print only `Running target <name>` lines
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Emit detailed progress to stdout
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Don't prepend POSIX-shell `-e` (fail-on-first-error) semantics to formulas
    #[arg(long = "no-enhanced-errors")]
    pub no_enhanced_errors: bool,

    /// Override a Sakefile macro: `-D NAME=VAL`, or `-D NAME` for `VAL="1"`
    #[arg(short = 'D', value_name = "NAME[=VAL]")]
    pub defines: Vec<String>,

    /// Use FILE as the Sakefile instead of the default search order
    #[arg(short = 's', long = "sakefile", value_name = "FILE")]
    pub sakefile: Option<PathBuf>,

    /// Emit DOT text instead of invoking `dot` to render (only with `visual`)
    #[arg(short = 'n', long = "no-render")]
    pub visual_dot_only: bool,

    /// Output file for `visual` (extension selects the render format)
    #[arg(short = 'f', long = "visual-file", value_name = "FILE")]
    pub visual_file: Option<PathBuf>,

    /// `help` | `clean` | `visual` | one or more target names
    #[arg(value_name = "TARGET")]
    pub positionals: Vec<String>,
}

/// What the positional arguments resolved to.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Help,
    Clean,
    Visual,
    Build(Vec<String>),
}

impl Args {
    pub fn action(&self) -> Action {
        match self.positionals.first().map(String::as_str) {
            Some("help") => Action::Help,
            Some("clean") => Action::Clean,
            Some("visual") => Action::Visual,
            _ => Action::Build(self.positionals.clone()),
        }
    }

    /// Parses `-D` entries into a macro-name/value map; a bare `NAME` with
    /// no `=VAL` means `VAL="1"`.
    pub fn macro_overrides(&self) -> std::collections::HashMap<String, String> {
        let mut map = std::collections::HashMap::new();
        for define in &self.defines {
            match define.split_once('=') {
                Some((name, value)) => {
                    map.insert(name.to_string(), value.to_string());
                }
                None => {
                    map.insert(define.clone(), "1".to_string());
                }
            }
        }
        map
    }
}
