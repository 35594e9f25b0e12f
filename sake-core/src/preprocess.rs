//! Sakefile preprocessing: macro expansion, conditional/required macros,
//! include directives, and CLI overrides. Runs before YAML parsing.

use indexmap::IndexMap;
use log::debug;
use sake_types::{SakeError, SakeResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The text of one included file, together with its own (recursively
/// expanded) includes. Kept around mainly for diagnostics; the expanded
/// text is already folded into the parent's `ExpandedSource::text`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncludedFile {
    pub path: PathBuf,
    pub text: String,
    pub includes: Vec<IncludedFile>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpandedSource {
    pub text: String,
    pub includes: Vec<IncludedFile>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MacroKind {
    Unconditional,
    Conditional,
}

enum Directive<'a> {
    Define {
        name: &'a str,
        value: &'a str,
        kind: MacroKind,
    },
    Required {
        name: &'a str,
        message: &'a str,
    },
    Include {
        path: &'a str,
        optional: bool,
        missing_message: Option<&'a str>,
    },
    None,
}

fn classify_line(line: &str) -> SakeResult<Directive<'_>> {
    let trimmed = line.trim_start();

    if let Some(rest) = trimmed.strip_prefix("#!") {
        let rest = rest.trim();
        if let Some(idx) = rest.find(" or ") {
            let name = rest[..idx].trim();
            let message = rest[idx + 4..].trim();
            // A bare name with no '=' before " or " is `#! NAME or MESSAGE`
            // (required-macro check). Otherwise " or " is just part of a
            // macro's value (e.g. `#! LDLIBS = m or die`) and must fall
            // through to the `?=`/`=` handling below.
            if !name.contains('=') && is_valid_macro_name(name) {
                return Ok(Directive::Required { name, message });
            }
        }
        if let Some(idx) = rest.find("?=") {
            let name = rest[..idx].trim();
            let value = rest[idx + 2..].trim();
            if !is_valid_macro_name(name) {
                return Err(SakeError::InvalidMacro(format!(
                    "invalid macro name '{}' in directive '{}'",
                    name, line
                )));
            }
            return Ok(Directive::Define {
                name,
                value,
                kind: MacroKind::Conditional,
            });
        }
        if let Some(idx) = rest.find('=') {
            let name = rest[..idx].trim();
            let value = rest[idx + 1..].trim();
            if !is_valid_macro_name(name) {
                return Err(SakeError::InvalidMacro(format!(
                    "invalid macro name '{}' in directive '{}'",
                    name, line
                )));
            }
            return Ok(Directive::Define {
                name,
                value,
                kind: MacroKind::Unconditional,
            });
        }
        return Err(SakeError::InvalidMacro(format!(
            "malformed macro directive: '{}'",
            line
        )));
    }

    if let Some(rest) = trimmed.strip_prefix("#<") {
        let rest = rest.trim();
        if let Some(idx) = rest.find(" or ") {
            let path = rest[..idx].trim();
            let message = rest[idx + 4..].trim();
            return Ok(Directive::Include {
                path,
                optional: false,
                missing_message: Some(message),
            });
        }
        if let Some(path) = rest.strip_suffix("optional") {
            return Ok(Directive::Include {
                path: path.trim(),
                optional: true,
                missing_message: None,
            });
        }
        return Ok(Directive::Include {
            path: rest,
            optional: false,
            missing_message: None,
        });
    }

    Ok(Directive::None)
}

fn is_valid_macro_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Substitutes `$NAME`/`${NAME}` in a single line with the resolved macro
/// value; `$$` escapes to a literal `$`. Macro-definition lines are
/// substituted too (so later macros may reference earlier ones) but a
/// macro never expands into itself on the line that defines it — callers
/// achieve that by substituting before recording the new definition.
fn substitute_line(line: &str, macros: &IndexMap<String, String>) -> String {
    let mut out = String::with_capacity(line.len());
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == '$' && i + 1 < bytes.len() && bytes[i + 1] as char == '$' {
            out.push('$');
            i += 2;
            continue;
        }
        if c == '$' {
            let rest = &line[i + 1..];
            if let Some(braced) = rest.strip_prefix('{') {
                if let Some(end) = braced.find('}') {
                    let name = &braced[..end];
                    if let Some(val) = macros.get(name) {
                        out.push_str(val);
                        i += 1 + 1 + end + 1;
                        continue;
                    }
                }
            } else {
                let name_len = rest
                    .char_indices()
                    .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
                    .count();
                if name_len > 0 {
                    let name = &rest[..name_len];
                    if let Some(val) = macros.get(name) {
                        out.push_str(val);
                        i += 1 + name_len;
                        continue;
                    }
                }
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

struct Preprocessor<'a> {
    overrides: &'a HashMap<String, String>,
    macros: IndexMap<String, String>,
    defined_by_cli: std::collections::HashSet<String>,
    visited_includes: std::collections::HashSet<PathBuf>,
}

impl<'a> Preprocessor<'a> {
    fn new(overrides: &'a HashMap<String, String>) -> Self {
        let mut macros = IndexMap::new();
        let defined_by_cli = overrides.keys().cloned().collect();
        for (k, v) in overrides {
            macros.insert(k.clone(), v.clone());
        }
        Preprocessor {
            overrides,
            macros,
            defined_by_cli,
            visited_includes: std::collections::HashSet::new(),
        }
    }

    fn expand_text(&mut self, raw_text: &str, base_dir: &Path) -> SakeResult<(String, Vec<IncludedFile>)> {
        let mut out_lines = Vec::new();
        let mut includes = Vec::new();

        for line in raw_text.lines() {
            let substituted_before_classify = substitute_line(line, &self.macros);
            match classify_line(&substituted_before_classify)? {
                Directive::Define { name, value, kind } => {
                    if self.defined_by_cli.contains(name) {
                        debug!("macro '{}' overridden on the command line, ignoring Sakefile definition", name);
                    } else {
                        match kind {
                            MacroKind::Conditional => {
                                self.macros.entry(name.to_string()).or_insert_with(|| value.to_string());
                            }
                            MacroKind::Unconditional => {
                                self.macros.insert(name.to_string(), value.to_string());
                            }
                        }
                    }
                    out_lines.push(substituted_before_classify);
                }
                Directive::Required { name, message } => {
                    if !self.macros.contains_key(name) {
                        return Err(SakeError::InvalidMacro(format!(
                            "required macro '{}' is undefined: {}",
                            name, message
                        )));
                    }
                    out_lines.push(substituted_before_classify);
                }
                Directive::Include {
                    path,
                    optional,
                    missing_message,
                } => {
                    let resolved = base_dir.join(path);
                    if !resolved.is_file() {
                        if optional {
                            debug!("optional include '{}' not found, skipping", path);
                            continue;
                        }
                        if let Some(message) = missing_message {
                            println!("{}", message);
                            continue;
                        }
                        return Err(SakeError::MissingInclude(format!(
                            "required include '{}' was not found",
                            path
                        )));
                    }
                    let canonical = resolved.canonicalize().unwrap_or(resolved.clone());
                    if !self.visited_includes.insert(canonical) {
                        debug!("include '{}' already loaded, skipping duplicate", path);
                        continue;
                    }
                    let included_text = std::fs::read_to_string(&resolved)?;
                    let include_dir = resolved.parent().unwrap_or(base_dir).to_path_buf();
                    let (expanded, nested_includes) =
                        self.expand_text(&included_text, &include_dir)?;
                    out_lines.push(expanded.clone());
                    includes.push(IncludedFile {
                        path: resolved,
                        text: expanded,
                        includes: nested_includes,
                    });
                }
                Directive::None => {
                    out_lines.push(substituted_before_classify);
                }
            }
        }

        Ok((out_lines.join("\n"), includes))
    }
}

/// Expands macros and includes in `raw_text`, whose file lives in
/// `base_dir` (includes are resolved relative to it). `overrides` are CLI
/// `-D NAME=VAL` macro definitions, which always win over both `=` and
/// `?=` definitions found in the text.
pub fn preprocess(
    raw_text: &str,
    base_dir: &Path,
    overrides: &HashMap<String, String>,
) -> SakeResult<ExpandedSource> {
    let mut pp = Preprocessor::new(overrides);
    let (text, includes) = pp.expand_text(raw_text, base_dir)?;
    Ok(ExpandedSource { text, includes })
}
