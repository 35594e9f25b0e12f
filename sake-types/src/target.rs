//! The target data model: one atomic unit of work, or a named group of them.

use serde::{Deserialize, Serialize};

/// An atomic target: something with a formula that produces outputs from
/// inputs. `help` is required by the Sakefile format (enforced by
/// `sake_core::audit`, not by this type) except for the synthetic `all`
/// root, which isn't represented as a `Target` at all.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub help: Option<String>,
    pub formula: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub output: Vec<String>,
    /// Name of the meta-target this atom was declared under, if any.
    pub parent: Option<String>,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Target {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_meta_candidate(&self) -> bool {
        self.formula.is_none()
    }
}

/// A named group of atoms. Has `help` but no `formula` of its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTarget {
    pub name: String,
    pub help: String,
    pub atoms: Vec<Target>,
}

impl MetaTarget {
    pub fn atom_names(&self) -> Vec<&str> {
        self.atoms.iter().map(|a| a.name.as_str()).collect()
    }
}

/// Either kind of named entry a Sakefile can declare (excluding the
/// reserved `all` key, which is tracked separately on `Sakefile`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SakefileEntry {
    Atom(Target),
    Meta(MetaTarget),
}

impl SakefileEntry {
    pub fn name(&self) -> &str {
        match self {
            SakefileEntry::Atom(t) => &t.name,
            SakefileEntry::Meta(m) => &m.name,
        }
    }

    pub fn help(&self) -> Option<&str> {
        match self {
            SakefileEntry::Atom(t) => t.help.as_deref(),
            SakefileEntry::Meta(m) => Some(&m.help),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_new_has_no_formula() {
        let t = Target::new("compile a");
        assert!(t.is_meta_candidate());
    }

    #[test]
    fn meta_target_atom_names_preserve_order() {
        let meta = MetaTarget {
            name: "compile".into(),
            help: "compile everything".into(),
            atoms: vec![Target::new("compile b"), Target::new("compile a")],
        };
        assert_eq!(meta.atom_names(), vec!["compile b", "compile a"]);
    }
}
