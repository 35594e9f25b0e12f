//! Pattern (`%name`/`%{name}`) target expansion: multiplies one templated
//! atom into zero or more concrete atoms by enumerating the filesystem.
//! Wildcard (`*`, `?`) dependency/output globbing is a separate mechanism
//! and lives in `graph`, resolved later at graph-build time.

use glob::glob;
use sake_types::{MetaTarget, SakeError, SakeResult, Sakefile, SakefileEntry, Target};
use std::collections::HashMap;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(String),
}

fn tokenize(s: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '%' && chars.get(i + 1) == Some(&'%') {
            literal.push('%');
            i += 2;
            continue;
        }
        if c == '{' && chars.get(i + 1) == Some(&'{') {
            literal.push('{');
            i += 2;
            continue;
        }
        if c == '}' && chars.get(i + 1) == Some(&'}') {
            literal.push('}');
            i += 2;
            continue;
        }
        if c == '%' && chars.get(i + 1) == Some(&'{') {
            let mut j = i + 2;
            let mut name = String::new();
            while j < chars.len() && chars[j] != '}' {
                name.push(chars[j]);
                j += 1;
            }
            if j < chars.len() && !name.is_empty() {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Var(name));
                i = j + 1;
                continue;
            }
        }
        if c == '%' {
            let mut j = i + 1;
            let mut name = String::new();
            while j < chars.len()
                && (chars[j].is_ascii_alphanumeric() || chars[j] == '_')
            {
                name.push(chars[j]);
                j += 1;
            }
            if !name.is_empty() {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Var(name));
                i = j;
                continue;
            }
        }
        literal.push(c);
        i += 1;
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

fn has_pattern(s: &str) -> bool {
    tokenize(s).iter().any(|seg| matches!(seg, Segment::Var(_)))
}

fn vars_in(segments: &[Segment]) -> Vec<String> {
    let mut out = Vec::new();
    for seg in segments {
        if let Segment::Var(name) = seg {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
    }
    out
}

fn glob_pattern(segments: &[Segment]) -> String {
    let mut out = String::new();
    for seg in segments {
        match seg {
            Segment::Literal(l) => out.push_str(l),
            Segment::Var(_) => out.push('*'),
        }
    }
    out
}

fn substitute(segments: &[Segment], bindings: &HashMap<String, String>) -> String {
    let mut out = String::new();
    for seg in segments {
        match seg {
            Segment::Literal(l) => out.push_str(l),
            Segment::Var(name) => {
                if let Some(v) = bindings.get(name) {
                    out.push_str(v);
                }
            }
        }
    }
    out
}

fn match_candidate(segments: &[Segment], candidate: &str) -> Option<HashMap<String, String>> {
    let mut bindings = HashMap::new();
    if match_rec(segments, candidate, &mut bindings) {
        Some(bindings)
    } else {
        None
    }
}

fn match_rec(segments: &[Segment], candidate: &str, bindings: &mut HashMap<String, String>) -> bool {
    match segments.split_first() {
        None => candidate.is_empty(),
        Some((Segment::Literal(lit), rest)) => {
            candidate.starts_with(lit.as_str())
                && match_rec(rest, &candidate[lit.len()..], bindings)
        }
        Some((Segment::Var(name), rest)) => {
            for len in 1..=candidate.len() {
                if !candidate.is_char_boundary(len) {
                    continue;
                }
                let val = &candidate[..len];
                let mut trial = bindings.clone();
                let consistent = match trial.get(name) {
                    Some(existing) => existing == val,
                    None => {
                        trial.insert(name.clone(), val.to_string());
                        true
                    }
                };
                if consistent && match_rec(rest, &candidate[len..], &mut trial) {
                    *bindings = trial;
                    return true;
                }
            }
            false
        }
    }
}

/// Candidate bindings for one pattern dependency string, collected by
/// globbing the filesystem for its `%var -> *` rendering and matching each
/// hit back against the template to recover variable values.
fn candidates_for(template: &str, cwd: &Path) -> SakeResult<Vec<HashMap<String, String>>> {
    let segments = tokenize(template);
    let pattern = glob_pattern(&segments);
    let full_pattern = cwd.join(&pattern);
    let mut out = Vec::new();
    for entry in glob(&full_pattern.to_string_lossy())
        .map_err(|e| SakeError::ParseError(format!("invalid pattern '{}': {}", template, e)))?
    {
        let path = entry.map_err(|e| SakeError::ParseError(e.to_string()))?;
        let relative = path.strip_prefix(cwd).unwrap_or(&path);
        let relative_str = relative.to_string_lossy().replace('\\', "/");
        if let Some(bindings) = match_candidate(&segments, &relative_str) {
            out.push(bindings);
        }
    }
    Ok(out)
}

fn intersect(a: Vec<String>, b: Vec<String>) -> Vec<String> {
    a.into_iter().filter(|v| b.contains(v)).collect()
}

/// Expands a single possibly-templated atom into zero or more concrete
/// atoms. Returns `vec![target.clone()]` unchanged when it declares no
/// pattern at all.
pub fn expand_target(target: &Target, cwd: &Path) -> SakeResult<Vec<Target>> {
    let name_segments = tokenize(&target.name);
    let pattern_deps: Vec<&String> = target
        .dependencies
        .iter()
        .filter(|d| has_pattern(d))
        .collect();

    if !has_pattern(&target.name) && pattern_deps.is_empty() && !target.output.iter().any(|o| has_pattern(o)) {
        return Ok(vec![target.clone()]);
    }

    if pattern_deps.is_empty() {
        return Err(SakeError::IntegrityError(format!(
            "target '{}' uses a pattern but declares no pattern dependency to enumerate it from",
            target.name
        )));
    }

    let name_vars = vars_in(&name_segments);
    let dep_vars: Vec<String> = pattern_deps
        .iter()
        .flat_map(|d| vars_in(&tokenize(d)))
        .fold(Vec::new(), |mut acc, v| {
            if !acc.contains(&v) {
                acc.push(v);
            }
            acc
        });

    for var in &dep_vars {
        if !name_vars.contains(var) {
            return Err(SakeError::IntegrityError(format!(
                "target '{}' has dependency pattern '%{}' not present in its own name",
                target.name, var
            )));
        }
    }

    if target.output.is_empty() {
        return Err(SakeError::IntegrityError(format!(
            "target '{}' uses patterns but declares no 'output'",
            target.name
        )));
    }

    let mut value_sets: HashMap<String, Vec<String>> = HashMap::new();
    for dep in &pattern_deps {
        let segments = tokenize(dep);
        let vars = vars_in(&segments);
        let hits = candidates_for(dep, cwd)?;
        for var in &vars {
            let mut values: Vec<String> = hits
                .iter()
                .filter_map(|b| b.get(var).cloned())
                .collect();
            values.sort();
            values.dedup();
            value_sets
                .entry(var.clone())
                .and_modify(|existing| {
                    let merged = intersect(existing.clone(), values.clone());
                    *existing = merged;
                })
                .or_insert(values);
        }
    }

    let mut ordered_vars: Vec<String> = dep_vars.clone();
    ordered_vars.sort();

    let mut tuples: Vec<HashMap<String, String>> = vec![HashMap::new()];
    for var in &ordered_vars {
        let values = value_sets.get(var).cloned().unwrap_or_default();
        let mut next = Vec::new();
        for tuple in &tuples {
            for value in &values {
                let mut extended = tuple.clone();
                extended.insert(var.clone(), value.clone());
                next.push(extended);
            }
        }
        tuples = next;
    }

    let mut results = Vec::new();
    for bindings in tuples {
        let mut all_deps_exist = true;
        for dep in &pattern_deps {
            let segments = tokenize(dep);
            let resolved = substitute(&segments, &bindings);
            if !cwd.join(&resolved).is_file() {
                all_deps_exist = false;
                break;
            }
        }
        if !all_deps_exist {
            continue;
        }

        let concrete_name = substitute(&name_segments, &bindings);
        let concrete_formula = target
            .formula
            .as_ref()
            .map(|f| substitute(&tokenize(f), &bindings));
        let concrete_deps: Vec<String> = target
            .dependencies
            .iter()
            .map(|d| substitute(&tokenize(d), &bindings))
            .collect();
        let concrete_output: Vec<String> = target
            .output
            .iter()
            .map(|o| substitute(&tokenize(o), &bindings))
            .collect();

        results.push(Target {
            name: concrete_name,
            help: target.help.clone(),
            formula: concrete_formula,
            dependencies: concrete_deps,
            output: concrete_output,
            parent: target.parent.clone(),
        });
    }

    results.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(results)
}

/// Expands every atom (including meta-targets' atoms) of a `Sakefile`,
/// preserving declaration order of the top-level entries.
pub fn expand_sakefile(sakefile: &Sakefile, cwd: &Path) -> SakeResult<Sakefile> {
    let mut expanded = Sakefile {
        entries: Default::default(),
        all: sakefile.all.clone(),
    };

    for (name, entry) in &sakefile.entries {
        match entry {
            SakefileEntry::Atom(t) => {
                for concrete in expand_target(t, cwd)? {
                    expanded
                        .entries
                        .insert(concrete.name.clone(), SakefileEntry::Atom(concrete));
                }
            }
            SakefileEntry::Meta(m) => {
                let mut atoms = Vec::new();
                for atom in &m.atoms {
                    atoms.extend(expand_target(atom, cwd)?);
                }
                expanded.entries.insert(
                    name.clone(),
                    SakefileEntry::Meta(MetaTarget {
                        name: m.name.clone(),
                        help: m.help.clone(),
                        atoms,
                    }),
                );
            }
        }
    }

    Ok(expanded)
}
