//! Orchestrates a build: selects the effective subgraph, decides
//! staleness, runs stale formulas (serially or in parallel, one OS child
//! process per target), and keeps the fingerprint store durable.

use crate::graph::{self, Graph, TiesMap};
use crate::schedule::{self, Settings};
use crate::store;
use log::debug;
use sake_types::{SakeError, SakeResult, Sakefile, Target};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::process::{Command, Stdio};

/// Flattens a Sakefile's atoms into a name-keyed lookup, used throughout a
/// build run instead of re-walking meta-targets repeatedly.
fn atom_index(sakefile: &Sakefile) -> HashMap<String, Target> {
    sakefile
        .atoms()
        .into_iter()
        .map(|t| (t.name.clone(), t.clone()))
        .collect()
}

fn shell_command(formula: &str, cwd: &Path, no_enhanced_errors: bool) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(formula);
        cmd.current_dir(cwd);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        if no_enhanced_errors {
            cmd.arg("-c").arg(formula);
        } else {
            cmd.arg("-ec").arg(formula);
        }
        cmd.current_dir(cwd);
        cmd
    }
}

/// Runs one target's formula to completion, printing the fixed `Running
/// target <name>` line first. Stdout/stderr stream straight through unless
/// `quiet`, in which case they're captured and, on failure, the captured
/// stderr is what's reported.
fn run_one(
    name: &str,
    formula: &str,
    cwd: &Path,
    settings: &Settings,
    no_enhanced_errors: bool,
) -> SakeResult<()> {
    println!("Running target {}", name);

    let mut cmd = shell_command(formula, cwd, no_enhanced_errors);
    if settings.quiet {
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
    } else {
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
    }

    let output = cmd
        .output()
        .map_err(|e| SakeError::FormulaFailed { target: name.to_string(), detail: e.to_string() })?;

    if output.status.success() {
        Ok(())
    } else {
        let detail = if settings.quiet {
            String::from_utf8_lossy(&output.stderr).to_string()
        } else {
            format!("exited with status {}", output.status)
        };
        Err(SakeError::FormulaFailed { target: name.to_string(), detail })
    }
}

/// Spawns one child process per target without waiting, for the parallel
/// path. Siblings are allowed to finish even if one fails.
fn spawn_one(name: &str, formula: &str, cwd: &Path, settings: &Settings, no_enhanced_errors: bool) -> SakeResult<std::process::Child> {
    let mut cmd = shell_command(formula, cwd, no_enhanced_errors);
    if settings.quiet {
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
    } else {
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
    }
    cmd.spawn()
        .map_err(|e| SakeError::FormulaFailed { target: name.to_string(), detail: e.to_string() })
}

fn all_referenced_paths(atoms: &HashMap<String, Target>, graph: &Graph, cwd: &Path) -> SakeResult<HashSet<String>> {
    let mut paths = HashSet::new();
    for target in atoms.values() {
        for dep in graph::resolve_wildcards(&target.dependencies, cwd)? {
            paths.insert(dep);
        }
        for out in graph::resolve_wildcards(&target.output, cwd)? {
            paths.insert(out);
        }
    }
    let _ = graph;
    Ok(paths)
}

struct TargetFiles {
    outputs: Vec<String>,
    dependencies: Vec<String>,
}

fn resolved_files(target: &Target, cwd: &Path) -> SakeResult<TargetFiles> {
    Ok(TargetFiles {
        outputs: graph::resolve_wildcards(&target.output, cwd)?,
        dependencies: graph::resolve_wildcards(&target.dependencies, cwd)?,
    })
}

/// Runs a whole build. Prints every stdout-contract line itself since those
/// lines are part of the executor/scheduler's observable behavior, not an
/// orchestration afterthought.
pub fn build(
    sakefile: &Sakefile,
    graph: &Graph,
    ties: &TiesMap,
    requested: &HashSet<String>,
    cwd: &Path,
    store_path: &Path,
    settings: &Settings,
    sake_version: &str,
    no_enhanced_errors: bool,
) -> SakeResult<()> {
    let atoms = atom_index(sakefile);

    let selection = schedule::select(graph, ties, requested);
    if selection.ties_enlarged {
        let mut names: Vec<&String> = selection.tie_closed.iter().collect();
        names.sort();
        println!("The following targets share dependencies and must be run together:");
        for name in names {
            println!("  - {}", name);
        }
    }

    let levels = schedule::compute_levels(graph, &selection.effective);

    if settings.recon {
        print_recon_plan(&levels, &atoms, cwd, store_path, settings, sake_version)?;
        return Ok(());
    }

    let mut store = store::load(store_path, sake_version)?;
    let referenced = all_referenced_paths(&atoms, graph, cwd)?;
    let referenced_vec: Vec<String> = referenced.iter().cloned().collect();
    let mut memory = store::hash_files(&referenced_vec, cwd);

    let subgraph_files: HashSet<String> = referenced;

    if settings.parallel {
        run_parallel_build(&levels, &atoms, cwd, &mut memory, &mut store, settings, sake_version, no_enhanced_errors, &subgraph_files, store_path)?;
    } else {
        run_serial_build(&levels, &atoms, cwd, &mut memory, &mut store, settings, sake_version, no_enhanced_errors, &subgraph_files, store_path)?;
    }

    println!("Done");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_serial_build(
    levels: &[Vec<String>],
    atoms: &HashMap<String, Target>,
    cwd: &Path,
    memory: &mut HashMap<String, String>,
    store: &mut sake_types::FingerprintStoreDocument,
    settings: &Settings,
    sake_version: &str,
    no_enhanced_errors: bool,
    subgraph_files: &HashSet<String>,
    store_path: &Path,
) -> SakeResult<()> {
    for level in levels {
        for name in level {
            let target = atoms
                .get(name)
                .ok_or_else(|| SakeError::UnknownTarget(name.clone()))?;
            let files = resolved_files(target, cwd)?;
            let decision = schedule::decide_staleness(&files.outputs, &files.dependencies, cwd, memory, store, settings);
            if !decision.is_stale() {
                debug!("target '{}' is fresh, skipping", name);
                continue;
            }

            let formula = target.formula.as_deref().unwrap_or("");
            run_one(name, formula, cwd, settings, no_enhanced_errors)?;

            update_after_success(target, cwd, memory, store, subgraph_files, sake_version, store_path)?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_parallel_build(
    levels: &[Vec<String>],
    atoms: &HashMap<String, Target>,
    cwd: &Path,
    memory: &mut HashMap<String, String>,
    store: &mut sake_types::FingerprintStoreDocument,
    settings: &Settings,
    sake_version: &str,
    no_enhanced_errors: bool,
    subgraph_files: &HashSet<String>,
    store_path: &Path,
) -> SakeResult<()> {
    for level in levels {
        let mut stale_names = Vec::new();
        for name in level {
            let target = atoms
                .get(name)
                .ok_or_else(|| SakeError::UnknownTarget(name.clone()))?;
            let files = resolved_files(target, cwd)?;
            let decision = schedule::decide_staleness(&files.outputs, &files.dependencies, cwd, memory, store, settings);
            if decision.is_stale() {
                stale_names.push(name.clone());
            }
        }

        if stale_names.is_empty() {
            continue;
        }

        if stale_names.len() == 1 {
            let name = &stale_names[0];
            let target = &atoms[name];
            let formula = target.formula.as_deref().unwrap_or("");
            run_one(name, formula, cwd, settings, no_enhanced_errors)?;
            update_after_success(target, cwd, memory, store, subgraph_files, sake_version, store_path)?;
            continue;
        }

        println!("Going to run these targets '{}' in parallel", stale_names.join(", "));

        let mut children = Vec::new();
        for name in &stale_names {
            println!("Running target {}", name);
            let target = &atoms[name];
            let formula = target.formula.as_deref().unwrap_or("");
            let child = spawn_one(name, formula, cwd, settings, no_enhanced_errors)?;
            children.push((name.clone(), child));
        }

        let mut failed = Vec::new();
        let mut succeeded = Vec::new();
        for (name, mut child) in children {
            let status = child
                .wait()
                .map_err(|e| SakeError::FormulaFailed { target: name.clone(), detail: e.to_string() })?;
            if status.success() {
                succeeded.push(name);
            } else {
                let detail = if settings.quiet {
                    let mut stderr_text = String::new();
                    if let Some(mut stderr) = child.stderr.take() {
                        use std::io::Read;
                        let _ = stderr.read_to_string(&mut stderr_text);
                    }
                    stderr_text
                } else {
                    format!("exited with status {}", status)
                };
                failed.push((name, detail));
            }
        }

        for name in &succeeded {
            let target = &atoms[name];
            update_after_success(target, cwd, memory, store, subgraph_files, sake_version, store_path)?;
        }

        if !failed.is_empty() {
            for (name, detail) in &failed {
                eprintln!("target '{}' failed: {}", name, detail);
            }
            let (name, detail) = failed.into_iter().next().unwrap();
            return Err(SakeError::FormulaFailed { target: name, detail });
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn update_after_success(
    target: &Target,
    cwd: &Path,
    memory: &mut HashMap<String, String>,
    store: &mut sake_types::FingerprintStoreDocument,
    subgraph_files: &HashSet<String>,
    sake_version: &str,
    store_path: &Path,
) -> SakeResult<()> {
    let files = resolved_files(target, cwd)?;
    let mut to_hash: Vec<String> = files.outputs.clone();
    to_hash.extend(files.dependencies.iter().cloned());
    let updates = store::hash_files(&to_hash, cwd);
    for (path, sha) in &updates {
        memory.insert(path.clone(), sha.clone());
    }

    let previous = std::mem::replace(store, sake_types::FingerprintStoreDocument::new(sake_version));
    let merged = store::merge(previous, subgraph_files, &updates, &HashSet::new(), sake_version);
    *store = merged;
    store::save(store_path, store)?;
    Ok(())
}

fn print_recon_plan(
    levels: &[Vec<String>],
    atoms: &HashMap<String, Target>,
    cwd: &Path,
    store_path: &Path,
    settings: &Settings,
    sake_version: &str,
) -> SakeResult<()> {
    let store = store::load(store_path, sake_version)?;
    let referenced: Vec<String> = atoms
        .values()
        .map(|t| resolved_files(t, cwd))
        .collect::<SakeResult<Vec<_>>>()?
        .into_iter()
        .flat_map(|f| f.outputs.into_iter().chain(f.dependencies))
        .collect();
    let memory = store::hash_files(&referenced, cwd);

    for level in levels {
        let mut stale_names = Vec::new();
        for name in level {
            let target = &atoms[name];
            let files = resolved_files(target, cwd)?;
            let decision = schedule::decide_staleness(&files.outputs, &files.dependencies, cwd, &memory, &store, settings);
            if decision.is_stale() {
                stale_names.push(name.clone());
            }
        }

        if stale_names.is_empty() {
            continue;
        }

        if settings.parallel {
            if stale_names.len() == 1 {
                println!("Would run target '{}'", stale_names[0]);
            } else {
                println!("Would run targets '{}' in parallel", stale_names.join(", "));
            }
        } else {
            for name in &stale_names {
                println!("Would run target: {}", name);
            }
        }
    }

    Ok(())
}

/// Removes every file declared as `output` by any atom (after wildcard
/// resolution) plus the store itself. In recon mode, only prints the
/// to-be-deleted paths, sorted.
pub fn clean(sakefile: &Sakefile, cwd: &Path, store_path: &Path, recon: bool) -> SakeResult<()> {
    let mut paths: Vec<String> = Vec::new();
    for target in sakefile.atoms() {
        for out in graph::resolve_wildcards(&target.output, cwd)? {
            paths.push(out);
        }
    }
    if store_path.is_file() {
        paths.push(store::STORE_FILENAME.to_string());
    }
    paths.sort();
    paths.dedup();

    if recon {
        for path in &paths {
            println!("Would remove file: {}", path);
        }
        return Ok(());
    }

    for path in &paths {
        let full = cwd.join(path);
        if full.is_file() {
            std::fs::remove_file(&full)?;
        }
    }
    println!("All clean");
    Ok(())
}
