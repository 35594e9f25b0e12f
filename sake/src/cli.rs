//! Bootstrapping: Sakefile discovery and loading, the help listing, root
//! target resolution, and the `visual` DOT exporter. Each of these is a
//! thin collaborator around the `sake-core` engine.

use sake_core::graph::Graph;
use sake_types::{SakeError, SakeResult, Sakefile, SakefileEntry};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;

const SEARCH_ORDER: &[&str] = &["Sakefile", "Sakefile.yaml", "Sakefile.yml"];

/// Resolves which file to read as the Sakefile: the explicit `-s FILE`
/// when given, otherwise the first of the default search order that
/// exists in `cwd`.
pub fn find_sakefile(explicit: Option<&Path>, cwd: &Path) -> SakeResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(cwd.join(path));
    }
    for name in SEARCH_ORDER {
        let candidate = cwd.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(SakeError::MissingFile(format!(
        "no Sakefile found in '{}' (looked for {})",
        cwd.display(),
        SEARCH_ORDER.join(", ")
    )))
}

/// Reads, preprocesses, parses/audits and pattern-expands a Sakefile into
/// its final concrete form.
pub fn load_sakefile(
    path: &Path,
    cwd: &Path,
    overrides: &HashMap<String, String>,
) -> SakeResult<Sakefile> {
    let raw_text = std::fs::read_to_string(path)?;
    let expanded = sake_core::preprocess(&raw_text, cwd, overrides)?;
    let parsed = sake_core::parse_and_audit(&expanded.text)?;
    sake_core::expand_sakefile(&parsed, cwd)
}

/// Resolves CLI positional target names to the atom set scheduling should
/// operate over. An empty `requested` means "every root": the atoms named
/// under `all` when declared, else every sink in the graph. Meta-target
/// names expand to all of their atoms.
pub fn resolve_requested(
    sakefile: &Sakefile,
    graph: &Graph,
    requested: &[String],
) -> SakeResult<HashSet<String>> {
    if requested.is_empty() {
        return Ok(resolve_roots(sakefile, graph));
    }

    let mut resolved = HashSet::new();
    for name in requested {
        match sakefile.get(name) {
            Some(SakefileEntry::Atom(t)) => {
                resolved.insert(t.name.clone());
            }
            Some(SakefileEntry::Meta(m)) => {
                for atom in &m.atoms {
                    resolved.insert(atom.name.clone());
                }
            }
            None => return Err(SakeError::UnknownTarget(name.clone())),
        }
    }
    Ok(resolved)
}

fn resolve_roots(sakefile: &Sakefile, graph: &Graph) -> HashSet<String> {
    if let Some(all) = &sakefile.all {
        return all.iter().cloned().collect();
    }
    sakefile
        .atoms()
        .into_iter()
        .filter(|t| {
            graph
                .node(&t.name)
                .map(|idx| graph.successors(idx).is_empty())
                .unwrap_or(true)
        })
        .map(|t| t.name.clone())
        .collect()
}

fn quote_if_whitespace(name: &str) -> String {
    if name.contains(char::is_whitespace) {
        format!("\"{}\"", name)
    } else {
        name.to_string()
    }
}

/// Emits the deterministic help listing: top-level names sorted, atom
/// names within a meta-target sorted, `all` never printed, `clean`/`visual`
/// pinned to the end with their fixed explanatory strings.
pub fn print_help(sakefile: &Sakefile) {
    let mut names: Vec<&String> = sakefile.entries.keys().collect();
    names.sort();

    for name in names {
        let entry = &sakefile.entries[name];
        match entry {
            SakefileEntry::Atom(t) => {
                println!(
                    "{}\t{}",
                    quote_if_whitespace(name),
                    t.help.as_deref().unwrap_or("")
                );
            }
            SakefileEntry::Meta(m) => {
                println!("{}\t{}", quote_if_whitespace(name), m.help);
                let mut atom_names: Vec<&str> = m.atom_names();
                atom_names.sort();
                for atom_name in atom_names {
                    println!("  {}", quote_if_whitespace(atom_name));
                }
            }
        }
    }

    println!(
        "{}\t{}",
        "clean", "remove all targets' outputs and start from scratch"
    );
    println!(
        "{}\t{}",
        "visual", "output visual representation of project's dependencies"
    );
}

/// Renders the effective dependency graph as DOT text:
/// `strict digraph DependencyDiagram { ... }`, edges sorted
/// lexicographically, isolated nodes listed afterward, also sorted.
pub fn render_dot(graph: &Graph) -> String {
    let mut edges: Vec<(String, String)> = Vec::new();
    let mut connected: HashSet<String> = HashSet::new();

    for edge in graph.graph.edge_indices() {
        if let Some((src, dst)) = graph.graph.edge_endpoints(edge) {
            let src_name = graph.name_of(src).to_string();
            let dst_name = graph.name_of(dst).to_string();
            connected.insert(src_name.clone());
            connected.insert(dst_name.clone());
            edges.push((src_name, dst_name));
        }
    }
    edges.sort();

    let mut isolated: Vec<String> = graph
        .nodes
        .keys()
        .filter(|n| !connected.contains(*n))
        .cloned()
        .collect();
    isolated.sort();

    let mut out = String::from("strict digraph DependencyDiagram {\n");
    for (src, dst) in &edges {
        out.push_str(&format!("\"{}\" -> \"{}\";\n", src, dst));
    }
    for name in &isolated {
        out.push_str(&format!("\"{}\"\n", name));
    }
    out.push('}');
    out
}

fn render_format_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "png",
        Some("jpg") | Some("jpeg") => "jpg",
        Some("gif") => "gif",
        Some("ps") => "ps",
        Some("pdf") => "pdf",
        _ => "svg",
    }
}

/// Writes the DOT text directly when `dot_only`, otherwise invokes the
/// system `dot` binary to render it to `output` (default `graph.svg`;
/// the file extension selects the output format).
pub fn visual(graph: &Graph, dot_only: bool, output: Option<&Path>, cwd: &Path) -> SakeResult<()> {
    let dot = render_dot(graph);

    if dot_only {
        println!("{}", dot);
        return Ok(());
    }

    let default_path = cwd.join("graph.svg");
    let out_path = output.map(|p| cwd.join(p)).unwrap_or(default_path);
    let format = render_format_for(&out_path);

    let dot_source = cwd.join(".sake-graph.dot");
    std::fs::write(&dot_source, &dot)?;

    let status = Command::new("dot")
        .arg(format!("-T{}", format))
        .arg("-o")
        .arg(&out_path)
        .arg(&dot_source)
        .status()
        .map_err(|e| SakeError::MissingFile(format!("could not invoke 'dot': {}", e)))?;

    let _ = std::fs::remove_file(&dot_source);

    if !status.success() {
        return Err(SakeError::FormulaFailed {
            target: "visual".to_string(),
            detail: format!("'dot' exited with status {}", status),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sake_core::graph::build_graph;
    use sake_types::Target;
    use tempfile::tempdir;

    fn atom(name: &str, deps: &[&str], outputs: &[&str]) -> Target {
        Target {
            name: name.to_string(),
            help: Some(format!("help for {}", name)),
            formula: Some("echo".into()),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            output: outputs.iter().map(|s| s.to_string()).collect(),
            parent: None,
        }
    }

    fn sakefile_of(atoms: Vec<Target>) -> Sakefile {
        let mut sakefile = Sakefile::default();
        for a in atoms {
            sakefile.entries.insert(a.name.clone(), SakefileEntry::Atom(a));
        }
        sakefile
    }

    #[test]
    fn find_sakefile_prefers_explicit_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.sake");
        std::fs::write(&path, "").unwrap();
        let found = find_sakefile(Some(Path::new("custom.sake")), dir.path()).unwrap();
        assert_eq!(found, path);
    }

    #[test]
    fn find_sakefile_uses_search_order() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Sakefile.yml"), "").unwrap();
        let found = find_sakefile(None, dir.path()).unwrap();
        assert_eq!(found, dir.path().join("Sakefile.yml"));
    }

    #[test]
    fn missing_sakefile_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(find_sakefile(None, dir.path()).is_err());
    }

    #[test]
    fn roots_are_sinks_when_all_is_absent() {
        let dir = tempdir().unwrap();
        let sakefile = sakefile_of(vec![
            atom("compile a", &["a.c"], &["a.o"]),
            atom("link", &["a.o"], &["prog"]),
        ]);
        let (graph, _ties) = build_graph(&sakefile, dir.path()).unwrap();
        let roots = resolve_roots(&sakefile, &graph);
        assert_eq!(roots, HashSet::from(["link".to_string()]));
    }

    #[test]
    fn unknown_requested_target_is_an_error() {
        let dir = tempdir().unwrap();
        let sakefile = sakefile_of(vec![atom("compile a", &["a.c"], &["a.o"])]);
        let (graph, _ties) = build_graph(&sakefile, dir.path()).unwrap();
        let result = resolve_requested(&sakefile, &graph, &["nope".to_string()]);
        assert!(matches!(result, Err(SakeError::UnknownTarget(_))));
    }

    #[test]
    fn dot_export_sorts_edges_and_lists_isolated_nodes() {
        let dir = tempdir().unwrap();
        let sakefile = sakefile_of(vec![
            atom("compile a", &["a.c"], &["a.o"]),
            atom("link", &["a.o"], &["prog"]),
            atom("standalone", &[], &["notes.txt"]),
        ]);
        let (graph, _ties) = build_graph(&sakefile, dir.path()).unwrap();
        let dot = render_dot(&graph);
        assert!(dot.starts_with("strict digraph DependencyDiagram {\n"));
        assert!(dot.contains("\"compile a\" -> \"link\";"));
        assert!(dot.contains("\"standalone\""));
        assert!(dot.ends_with('}'));
    }
}
