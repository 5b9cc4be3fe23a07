#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

/// Session-wide identifier table. Names are interned once so that
/// identifier comparison is cheap pointer-or-content equality.
fn interner() -> &'static Mutex<HashMap<String, Arc<str>>> {
    static INTERNER: OnceLock<Mutex<HashMap<String, Arc<str>>>> = OnceLock::new();
    INTERNER.get_or_init(|| Mutex::new(HashMap::new()))
}

fn intern(name: &str) -> Arc<str> {
    let mut table = interner().lock().expect("identifier table poisoned");
    if let Some(existing) = table.get(name) {
        return existing.clone();
    }
    let shared: Arc<str> = Arc::from(name);
    table.insert(name.to_string(), shared.clone());
    shared
}

/// An interned name plus a disambiguation tag.
///
/// Tag 0 is the user-written name. The typechecker assigns fresh tags to
/// the overloads it resolves; passes that clone declarations must allocate
/// new tags rather than reuse old ones.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident {
    name: Arc<str>,
    tag: u32,
}

impl Ident {
    pub fn new(name: &str) -> Self {
        Self {
            name: intern(name),
            tag: 0,
        }
    }

    pub fn with_tag(&self, tag: u32) -> Self {
        Self {
            name: self.name.clone(),
            tag,
        }
    }

    /// Derive an identifier with a fixed suffix appended to the name,
    /// keeping the tag (getter/setter markers, monomorph suffixes).
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            name: intern(&format!("{}{}", self.name, suffix)),
            tag: self.tag,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// Compare by root name, ignoring the tag.
    pub fn root_matches(&self, other: &Ident) -> bool {
        self.name == other.name
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tag == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}__{}", self.name, self.tag)
        }
    }
}

impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ident({self})")
    }
}

/// A monotonically increasing supply of tagged identifiers.
///
/// Each supply has a fixed prefix; scopes create fresh supplies and reset
/// them per function body so generated names stay stable across runs.
#[derive(Clone, Debug)]
pub struct NameSupply {
    prefix: String,
    next: u32,
}

impl NameSupply {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            next: 0,
        }
    }

    /// A fresh identifier named after the supply's prefix.
    pub fn fresh(&mut self) -> Ident {
        self.next += 1;
        Ident::new(&self.prefix).with_tag(self.next)
    }

    /// A fresh identifier with a caller-supplied root under this supply's
    /// counter, e.g. `__tc_let` with a new tag.
    pub fn fresh_named(&mut self, root: &str) -> Ident {
        self.next += 1;
        Ident::new(&format!("{}{}", self.prefix, root)).with_tag(self.next)
    }

    /// A fresh bare tag, for cloning declarations without renaming them.
    pub fn fresh_tag(&mut self) -> u32 {
        self.next += 1;
        self.next
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_distinguishes_overloads() {
        let base = Ident::new("Mem_read");
        let a = base.with_tag(1);
        let b = base.with_tag(2);
        assert_ne!(a, b);
        assert!(a.root_matches(&b));
        assert!(a.root_matches(&base));
    }

    #[test]
    fn suffix_keeps_tag() {
        let f = Ident::new("PC").with_tag(7);
        let getter = f.with_suffix("__getter");
        assert_eq!(getter.name(), "PC__getter");
        assert_eq!(getter.tag(), 7);
    }

    #[test]
    fn supply_is_monotone() {
        let mut supply = NameSupply::new("__x");
        let a = supply.fresh();
        let b = supply.fresh();
        assert_ne!(a, b);
        assert!(a.tag() < b.tag());
        supply.reset();
        assert_eq!(supply.fresh(), a);
    }
}
