use indexmap::IndexSet;
use std::collections::HashMap;
use std::fmt;

/// A unique identifier for a variable.
pub type VarId = usize;

/// Interns program and temporary variables.
///
/// Variables are never removed, so ids are stable for the lifetime of the
/// problem. Temporary variables are the ones minted during lowering,
/// acceleration and chaining; they are existentially quantified on the rule
/// that introduces them and are not bound by the initial location's
/// signature.
#[derive(Debug, Clone, Default)]
pub struct VariableManager {
    names: Vec<String>,
    temporary: IndexSet<VarId>,
    lookup: HashMap<String, VarId>,
}

impl VariableManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `name` as a program variable, returning the existing id if
    /// the name is already known.
    pub fn intern(&mut self, name: &str) -> VarId {
        if let Some(&id) = self.lookup.get(name) {
            return id;
        }
        self.add(name.to_string())
    }

    /// Adds a fresh variable based on `basename`. The basename is used
    /// verbatim if still unused, otherwise `_k` suffixes are appended for
    /// increasing `k` until an unused name is found.
    pub fn fresh(&mut self, basename: &str, temporary: bool) -> VarId {
        let name = self.fresh_name(basename);
        let id = self.add(name);
        if temporary {
            self.temporary.insert(id);
        }
        id
    }

    pub fn is_temp(&self, id: VarId) -> bool {
        self.temporary.contains(&id)
    }

    /// Marks an already interned variable as temporary.
    pub fn mark_temp(&mut self, id: VarId) {
        debug_assert!(id < self.names.len());
        self.temporary.insert(id);
    }

    pub fn name(&self, id: VarId) -> &str {
        &self.names[id]
    }

    pub fn lookup(&self, name: &str) -> Option<VarId> {
        self.lookup.get(name).copied()
    }

    /// Ids of all variables, in creation order.
    pub fn all_vars(&self) -> impl Iterator<Item = VarId> + '_ {
        0..self.names.len()
    }

    pub fn temp_vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.temporary.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn add(&mut self, name: String) -> VarId {
        let id = self.names.len();
        self.lookup.insert(name.clone(), id);
        self.names.push(name);
        id
    }

    fn fresh_name(&self, basename: &str) -> String {
        if !self.lookup.contains_key(basename) {
            return basename.to_string();
        }
        let mut k = 1usize;
        loop {
            let candidate = format!("{basename}_{k}");
            if !self.lookup.contains_key(&candidate) {
                return candidate;
            }
            k += 1;
        }
    }
}

impl fmt::Display for VariableManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, name) in self.names.iter().enumerate() {
            if id > 0 {
                write!(f, " ")?;
            }
            if self.temporary.contains(&id) {
                write!(f, "{name}*")?;
            } else {
                write!(f, "{name}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut vars = VariableManager::new();
        let x = vars.intern("x");
        let y = vars.intern("y");
        assert_ne!(x, y);
        assert_eq!(vars.intern("x"), x);
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn fresh_appends_numeric_suffixes() {
        let mut vars = VariableManager::new();
        let a = vars.fresh("free", true);
        let b = vars.fresh("free", true);
        let c = vars.fresh("free", true);
        assert_eq!(vars.name(a), "free");
        assert_eq!(vars.name(b), "free_1");
        assert_eq!(vars.name(c), "free_2");
    }

    #[test]
    fn fresh_skips_interned_names() {
        let mut vars = VariableManager::new();
        vars.intern("n");
        let id = vars.fresh("n", false);
        assert_eq!(vars.name(id), "n_1");
        assert!(!vars.is_temp(id));
    }

    #[test]
    fn temp_flag_is_tracked_per_id() {
        let mut vars = VariableManager::new();
        let x = vars.intern("x");
        let t = vars.fresh("t", true);
        assert!(!vars.is_temp(x));
        assert!(vars.is_temp(t));
        vars.mark_temp(x);
        assert!(vars.is_temp(x));
    }

    #[test]
    fn ids_are_never_recycled() {
        let mut vars = VariableManager::new();
        let ids: Vec<_> = (0..10).map(|i| vars.fresh(&format!("v{i}"), false)).collect();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(*id, i);
        }
    }
}
