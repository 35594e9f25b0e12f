//! The `sake` binary: a self-documenting build automation tool.

#![forbid(unsafe_code)]

use clap::Parser;
use log::debug;
use sake::args::{Action, Args};
use sake::cli;
use sake_core::schedule::Settings;
use sake_types::SakeResult;
use std::process::ExitCode;

const SAKE_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();
    debug!("sake args = {:?}", args);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> SakeResult<()> {
    let cwd = std::env::current_dir()?;
    let sakefile_path = cli::find_sakefile(args.sakefile.as_deref(), &cwd)?;
    let overrides = args.macro_overrides();
    let sakefile = cli::load_sakefile(&sakefile_path, &cwd, &overrides)?;
    let store_path = cwd.join(sake_core::store::STORE_FILENAME);

    match args.action() {
        Action::Help => {
            cli::print_help(&sakefile);
            Ok(())
        }
        Action::Clean => sake_core::clean(&sakefile, &cwd, &store_path, args.recon),
        Action::Visual => {
            let (graph, _ties) = sake_core::build_graph(&sakefile, &cwd)?;
            cli::visual(&graph, args.visual_dot_only, args.visual_file.as_deref(), &cwd)
        }
        Action::Build(targets) => {
            let (graph, ties) = sake_core::build_graph(&sakefile, &cwd)?;
            let requested = cli::resolve_requested(&sakefile, &graph, &targets)?;
            let settings = Settings {
                force: args.force,
                recon: args.recon,
                parallel: args.parallel,
                quiet: args.quiet,
                verbose: args.verbose,
            };
            sake_core::build(
                &sakefile,
                &graph,
                &ties,
                &requested,
                &cwd,
                &store_path,
                &settings,
                SAKE_VERSION,
                args.no_enhanced_errors,
            )
        }
    }
}
