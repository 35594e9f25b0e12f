//! The parsed (but not yet expanded) Sakefile: an ordered mapping from name
//! to target or meta-target, plus the reserved `all` root list.

use crate::target::SakefileEntry;
use indexmap::IndexMap;

#[derive(Clone, Debug, Default)]
pub struct Sakefile {
    /// Declaration order preserved; this is what the help listing and the
    /// within-level alphabetic tie-break both ultimately sort from a stable
    /// base.
    pub entries: IndexMap<String, SakefileEntry>,
    /// The `all` target's declared list of roots, if the Sakefile declares
    /// one. `None` means "no explicit `all`": every atom with no successor
    /// is a root.
    pub all: Option<Vec<String>>,
}

impl Sakefile {
    pub fn get(&self, name: &str) -> Option<&SakefileEntry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Every atom target in declaration order, meta-targets' atoms
    /// following their parent.
    pub fn atoms(&self) -> Vec<&crate::target::Target> {
        let mut out = Vec::new();
        for entry in self.entries.values() {
            match entry {
                SakefileEntry::Atom(t) => out.push(t),
                SakefileEntry::Meta(m) => out.extend(m.atoms.iter()),
            }
        }
        out
    }
}
