//! Turns the expanded target map into a dependency DAG: one node per atom,
//! an edge from producer to consumer wherever an output matches a
//! dependency, plus the "ties" relation used by the scheduler's selection
//! step.

use glob::{glob, Pattern};
use log::debug;
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use sake_types::{SakeError, SakeResult, Sakefile, Target};
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub type TargetName = String;

/// The dependency DAG: atom names as node weights, edges from producer to
/// consumer. Mirrors `cargo-geiger::graph::Graph`'s shape (a `petgraph::Graph`
/// plus a name-to-index lookup), with the payload swapped to a plain target
/// name and the edge weight dropped to `()`.
#[derive(Debug, Default)]
pub struct Graph {
    pub graph: petgraph::Graph<TargetName, ()>,
    pub nodes: HashMap<TargetName, NodeIndex>,
}

impl Graph {
    pub fn node(&self, name: &str) -> Option<NodeIndex> {
        self.nodes.get(name).copied()
    }

    pub fn successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph.neighbors_directed(idx, Direction::Outgoing).collect()
    }

    pub fn predecessors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph.neighbors_directed(idx, Direction::Incoming).collect()
    }

    pub fn name_of(&self, idx: NodeIndex) -> &str {
        &self.graph[idx]
    }
}

/// Maps each target name to the set of other target names it is tied to
/// (shares at least one declared dependency with).
pub type TiesMap = HashMap<TargetName, HashSet<TargetName>>;

fn is_wildcard(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

pub fn normalize_path(p: &str) -> String {
    let replaced = p.replace('\\', "/");
    replaced
        .strip_prefix("./")
        .map(|s| s.to_string())
        .unwrap_or(replaced)
}

/// Resolves any wildcard entries in `paths` against the filesystem rooted
/// at `cwd`, leaving literal (non-wildcard) entries untouched even when the
/// file doesn't exist yet — a declared-but-absent output is still a real
/// node attribute, just not yet produced.
pub fn resolve_wildcards(paths: &[String], cwd: &Path) -> SakeResult<Vec<String>> {
    let mut out = Vec::new();
    for p in paths {
        let normalized = normalize_path(p);
        if is_wildcard(&normalized) {
            let full = cwd.join(&normalized);
            let pattern = full.to_string_lossy().to_string();
            let mut matched_any = false;
            for entry in glob(&pattern)
                .map_err(|e| SakeError::ParseError(format!("invalid glob '{}': {}", p, e)))?
            {
                let path = entry.map_err(|e| SakeError::ParseError(e.to_string()))?;
                let relative = path.strip_prefix(cwd).unwrap_or(&path);
                out.push(normalize_path(&relative.to_string_lossy()));
                matched_any = true;
            }
            if !matched_any {
                debug!("wildcard '{}' matched no files yet", p);
            }
        } else {
            out.push(normalized);
        }
    }
    out
}

fn dependency_matches(dep: &str, candidate: &str) -> bool {
    if is_wildcard(dep) {
        Pattern::new(dep).map(|p| p.matches(candidate)).unwrap_or(false)
    } else {
        dep == candidate
    }
}

/// Builds the DAG and ties relation from the expanded (concrete, no
/// patterns remaining) target map.
pub fn build_graph(sakefile: &Sakefile, cwd: &Path) -> SakeResult<(Graph, TiesMap)> {
    let atoms: Vec<&Target> = sakefile.atoms();

    let mut graph = Graph::default();
    for atom in &atoms {
        let idx = graph.graph.add_node(atom.name.clone());
        graph.nodes.insert(atom.name.clone(), idx);
    }

    let mut resolved_outputs: HashMap<&str, Vec<String>> = HashMap::new();
    for atom in &atoms {
        resolved_outputs.insert(&atom.name, resolve_wildcards(&atom.output, cwd)?);
    }

    let mut edges = HashSet::new();
    for consumer in &atoms {
        let consumer_idx = graph.nodes[&consumer.name];
        for dep in &consumer.dependencies {
            let dep_normalized = normalize_path(dep);
            for producer in &atoms {
                if producer.name == consumer.name {
                    continue;
                }
                let producer_idx = graph.nodes[&producer.name];
                let outputs = &resolved_outputs[producer.name.as_str()];
                let matches = outputs.iter().any(|o| dependency_matches(&dep_normalized, o));
                if matches && edges.insert((producer_idx, consumer_idx)) {
                    graph.graph.add_edge(producer_idx, consumer_idx, ());
                }
            }
        }
    }

    if is_cyclic_directed(&graph.graph) {
        let sccs = tarjan_scc(&graph.graph);
        let cycle_names: Vec<String> = sccs
            .into_iter()
            .find(|scc| scc.len() > 1)
            .map(|scc| scc.iter().map(|idx| graph.graph[*idx].clone()).collect())
            .unwrap_or_default();
        return Err(SakeError::CycleDetected(cycle_names.join(" -> ")));
    }

    let ties = compute_ties(&atoms);

    Ok((graph, ties))
}

fn compute_ties(atoms: &[&Target]) -> TiesMap {
    let mut dep_to_targets: HashMap<String, Vec<String>> = HashMap::new();
    for atom in atoms {
        for dep in &atom.dependencies {
            dep_to_targets
                .entry(normalize_path(dep))
                .or_default()
                .push(atom.name.clone());
        }
    }

    let mut ties: TiesMap = HashMap::new();
    for targets in dep_to_targets.values() {
        if targets.len() < 2 {
            continue;
        }
        for name in targets {
            let entry = ties.entry(name.clone()).or_default();
            for other in targets {
                if other != name {
                    entry.insert(other.clone());
                }
            }
        }
    }
    ties
}

#[cfg(test)]
mod tests {
    use super::*;
    use sake_types::SakefileEntry;
    use tempfile::tempdir;

    fn atom(name: &str, deps: &[&str], outputs: &[&str]) -> Target {
        Target {
            name: name.to_string(),
            help: Some(format!("help for {}", name)),
            formula: Some(format!("echo {}", name)),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            output: outputs.iter().map(|s| s.to_string()).collect(),
            parent: None,
        }
    }

    fn sakefile_of(atoms: Vec<Target>) -> Sakefile {
        let mut sakefile = Sakefile::default();
        for a in atoms {
            sakefile
                .entries
                .insert(a.name.clone(), SakefileEntry::Atom(a));
        }
        sakefile
    }

    #[test]
    fn builds_edge_from_producer_to_consumer() {
        let dir = tempdir().unwrap();
        let sakefile = sakefile_of(vec![
            atom("compile a", &["a.c"], &["a.o"]),
            atom("link", &["a.o"], &["prog"]),
        ]);
        let (graph, _ties) = build_graph(&sakefile, dir.path()).unwrap();
        let a = graph.node("compile a").unwrap();
        let link = graph.node("link").unwrap();
        assert!(graph.successors(a).contains(&link));
    }

    #[test]
    fn detects_cycle() {
        let dir = tempdir().unwrap();
        let sakefile = sakefile_of(vec![
            atom("x", &["y.out"], &["x.out"]),
            atom("y", &["x.out"], &["y.out"]),
        ]);
        let result = build_graph(&sakefile, dir.path());
        assert!(matches!(result, Err(SakeError::CycleDetected(_))));
    }

    #[test]
    fn ties_group_targets_sharing_a_dependency() {
        let dir = tempdir().unwrap();
        let sakefile = sakefile_of(vec![
            atom("compile a", &["shared.h", "a.c"], &["a.o"]),
            atom("compile b", &["shared.h", "b.c"], &["b.o"]),
        ]);
        let (_graph, ties) = build_graph(&sakefile, dir.path()).unwrap();
        assert!(ties["compile a"].contains("compile b"));
        assert!(ties["compile b"].contains("compile a"));
    }

    #[rstest::rstest]
    #[case("*.o", "a.o", true)]
    #[case("*.o", "a.c", false)]
    #[case("src/*.c", "src/a.c", true)]
    #[case("src/*.c", "src/nested/a.c", false)]
    #[case("a.o", "a.o", true)]
    #[case("a.o", "b.o", false)]
    fn dependency_matches_glob_and_literal_forms(
        #[case] dep: &str,
        #[case] candidate: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(dependency_matches(dep, candidate), expected);
    }

    #[test]
    fn wildcard_dependency_matches_literal_output() {
        let dir = tempdir().unwrap();
        let sakefile = sakefile_of(vec![
            atom("compile a", &["a.c"], &["a.o"]),
            atom("link", &["*.o"], &["prog"]),
        ]);
        let (graph, _ties) = build_graph(&sakefile, dir.path()).unwrap();
        let a = graph.node("compile a").unwrap();
        let link = graph.node("link").unwrap();
        assert!(graph.successors(a).contains(&link));
    }
}
