//! Guard and update preparation for metering-function synthesis.

use indexmap::{IndexMap, IndexSet};
use num::One;

use loris_ir::expr::{Expr, Subs};
use loris_ir::rel::Rel;
use loris_ir::rule::Update;
use loris_ir::variables::{VarId, VariableManager};
use loris_smt::SmtOracle;

/// Per-variable cap on instantiation candidates, and a global cap on the
/// number of substitution combinations that are tried.
pub const INSTANTIATE_MAX_BOUNDS: usize = 3;
pub const INSTANTIATE_MAX_COMBINATIONS: usize = 27;

/// Replaces equalities by pairs of weak inequalities and strict
/// comparisons by their non-strict integer equivalents.
pub fn replace_equalities(guard: &[Rel]) -> Vec<Rel> {
    let mut out = Vec::with_capacity(guard.len());
    for atom in guard {
        if atom.is_equality() {
            out.push(Rel::le(atom.lhs.clone(), atom.rhs.clone()));
            out.push(Rel::ge(atom.lhs.clone(), atom.rhs.clone()));
        } else {
            out.push(atom.to_le());
        }
    }
    out
}

/// Keeps the atoms that can limit the number of loop iterations: atoms
/// with a temporary variable, and atoms over updated variables that are
/// not implied by the guard once the update is applied. The dropped
/// atoms are loop invariants and end up in `irrelevant`.
///
/// Soundness-critical direction: keeping too much is fine, dropping a
/// limiting constraint would permit wrong metering functions.
pub fn reduce_guard(
    vars: &VariableManager,
    oracle: &SmtOracle,
    guard: &[Rel],
    updates: &[&Update],
    irrelevant: &mut Vec<Rel>,
) -> Vec<Rel> {
    let mut updated: IndexSet<VarId> = IndexSet::new();
    for update in updates {
        for (v, _) in update.iter() {
            updated.insert(*v);
        }
    }
    let mut reduced = Vec::new();
    for atom in guard {
        if atom.has_var_where(|v| vars.is_temp(v)) {
            reduced.push(atom.clone());
            continue;
        }
        let mentions_updated = atom.has_var_where(|v| updated.contains(&v));
        let limiting = mentions_updated
            && updates.iter().any(|update| {
                let after = atom.subs(&update.as_subs());
                !oracle.implies(guard, &after, vars)
            });
        if limiting {
            reduced.push(atom.clone());
        } else {
            irrelevant.push(atom.clone());
        }
    }
    reduced
}

/// Variables that may appear in the metering template: everything in the
/// reduced guard, closed under "occurs in the update of a variable that
/// is already relevant".
pub fn find_relevant_variables(
    reduced_guard: &[Rel],
    updates: &[&Update],
) -> IndexSet<VarId> {
    let mut relevant: IndexSet<VarId> = IndexSet::new();
    for atom in reduced_guard {
        atom.collect_vars(&mut relevant);
    }
    loop {
        let mut added = false;
        for update in updates {
            for (v, rhs) in update.iter() {
                if !relevant.contains(v) {
                    continue;
                }
                for dep in rhs.vars() {
                    added |= relevant.insert(dep);
                }
            }
        }
        if !added {
            return relevant;
        }
    }
}

/// Drops guard atoms that touch none of the given variables.
pub fn restrict_guard_to_variables(guard: &mut Vec<Rel>, vars: &IndexSet<VarId>) {
    guard.retain(|atom| atom.has_var_where(|v| vars.contains(&v)));
}

/// Drops update entries whose left-hand side is not in the given set.
pub fn restrict_update_to_variables(update: &Update, vars: &IndexSet<VarId>) -> Update {
    Update(
        update
            .iter()
            .filter(|(v, _)| vars.contains(*v))
            .map(|(v, e)| (*v, e.clone()))
            .collect(),
    )
}

/// Propagates constant updates into the guard: when `x := e` with `e`
/// free of updated variables and the guard constrains `x`, the image
/// constraint is appended. Helps the Farkas query when a counter is
/// reset rather than counted.
pub fn strengthen_guard(guard: &mut Vec<Rel>, updates: &[&Update]) -> bool {
    let mut updated: IndexSet<VarId> = IndexSet::new();
    for update in updates {
        for (v, _) in update.iter() {
            updated.insert(*v);
        }
    }
    let mut additions = Vec::new();
    for update in updates {
        for (v, e) in update.iter() {
            if e.has_var_where(|w| updated.contains(&w)) {
                continue;
            }
            for atom in guard.iter() {
                if !atom.has_var(*v) {
                    continue;
                }
                let image = atom.subs(&Subs::from_iter([(*v, e.clone())]));
                if !image.is_trivially_true()
                    && !guard.contains(&image)
                    && !additions.contains(&image)
                {
                    additions.push(image);
                }
            }
        }
    }
    if additions.is_empty() {
        return false;
    }
    guard.extend(additions);
    true
}

/// Candidate substitutions instantiating temporaries by their guard
/// bounds (`t <= e` yields `t := e`). All combinations over the
/// temporaries are produced, capped per variable and globally.
pub fn find_instantiations_for_temp_vars(
    vars: &VariableManager,
    guard: &[Rel],
) -> Vec<Subs> {
    let mut temps: IndexSet<VarId> = IndexSet::new();
    for atom in guard {
        atom.collect_vars(&mut temps);
    }
    temps.retain(|v| vars.is_temp(*v));

    let mut candidates: IndexMap<VarId, Vec<Expr>> = IndexMap::new();
    for &t in &temps {
        let mut bounds = Vec::new();
        for atom in guard {
            if bounds.len() >= INSTANTIATE_MAX_BOUNDS {
                break;
            }
            if !atom.has_var(t) {
                continue;
            }
            let le = if atom.is_equality() {
                Rel::le(atom.lhs.clone(), atom.rhs.clone())
            } else {
                atom.to_le()
            };
            let diff = le.lhs.clone() - le.rhs.clone();
            let Some((coeffs, constant)) = diff.lin_coeffs() else {
                continue;
            };
            let Some(c) = coeffs.get(&t) else { continue };
            if !(c.is_one() || (-c.clone()).is_one()) {
                continue;
            }
            let mut rest: Vec<Expr> = coeffs
                .iter()
                .filter(|(v, _)| **v != t)
                .map(|(v, cf)| Expr::num(cf.clone()) * Expr::var(*v))
                .collect();
            rest.push(Expr::num(constant.clone()));
            let rest = Expr::add(rest);
            // c*t + rest <= 0: for c=1 the bound is t <= -rest, for c=-1
            // it is t >= rest; either endpoint is an instantiation.
            let bound = if c.is_one() { -rest } else { rest };
            if !bound.has_var(t) && !bounds.contains(&bound) {
                bounds.push(bound);
            }
        }
        if !bounds.is_empty() {
            candidates.insert(t, bounds);
        }
    }

    let mut combos: Vec<Subs> = vec![Subs::new()];
    for (t, bounds) in candidates {
        let mut next = combos.clone();
        for combo in &combos {
            for bound in &bounds {
                if next.len() >= INSTANTIATE_MAX_COMBINATIONS {
                    break;
                }
                let mut extended = combo.clone();
                extended.insert(t, bound.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    combos.retain(|s| !s.is_empty());
    combos
}

#[cfg(test)]
mod tests {
    use super::*;
    use loris_ir::rel::CmpOp;

    fn setup() -> (VariableManager, SmtOracle) {
        let mut vars = VariableManager::new();
        vars.intern("x");
        vars.intern("n");
        vars.fresh("free", true);
        (vars, SmtOracle::new(0))
    }

    fn x() -> Expr {
        Expr::var(0)
    }

    fn n() -> Expr {
        Expr::var(1)
    }

    fn t() -> Expr {
        Expr::var(2)
    }

    #[test]
    fn equalities_split_and_strict_ops_weaken() {
        let guard = vec![Rel::eq(x(), n()), Rel::lt(x(), n())];
        let replaced = replace_equalities(&guard);
        assert_eq!(replaced.len(), 3);
        assert!(replaced.iter().all(|r| matches!(r.op, CmpOp::Le | CmpOp::Ge)));
    }

    #[test]
    fn invariant_atoms_are_reduced_away() {
        let (vars, oracle) = setup();
        // x < n with x := x + 1: "n >= 0" is invariant, "x < n" limits.
        let mut update = Update::new();
        update.set(0, x() + Expr::one());
        let guard = vec![Rel::ge(n(), Expr::zero()), Rel::lt(x(), n())];
        let mut irrelevant = Vec::new();
        let reduced = reduce_guard(&vars, &oracle, &guard, &[&update], &mut irrelevant);
        assert_eq!(reduced, vec![Rel::lt(x(), n())]);
        assert_eq!(irrelevant, vec![Rel::ge(n(), Expr::zero())]);
    }

    #[test]
    fn atoms_with_temporaries_always_stay() {
        let (vars, oracle) = setup();
        let update = Update::new();
        let guard = vec![Rel::gt(t(), x())];
        let mut irrelevant = Vec::new();
        let reduced = reduce_guard(&vars, &oracle, &guard, &[&update], &mut irrelevant);
        assert_eq!(reduced.len(), 1);
        assert!(irrelevant.is_empty());
    }

    #[test]
    fn relevant_variables_close_under_updates() {
        // reduced guard mentions x; x is updated from n, so n is relevant
        let mut update = Update::new();
        update.set(0, n() - Expr::one());
        let reduced = vec![Rel::gt(x(), Expr::zero())];
        let relevant = find_relevant_variables(&reduced, &[&update]);
        assert!(relevant.contains(&0));
        assert!(relevant.contains(&1));
    }

    #[test]
    fn strengthening_propagates_resets() {
        // x := n with n not updated and guard x > 0: the image n > 0 is
        // appended.
        let mut update = Update::new();
        update.set(0, n());
        let mut guard = vec![Rel::gt(x(), Expr::zero())];
        assert!(strengthen_guard(&mut guard, &[&update]));
        assert_eq!(guard.len(), 2);
        assert_eq!(guard[1], Rel::gt(n(), Expr::zero()));
    }

    #[test]
    fn instantiations_come_from_unit_bounds() {
        let (vars, _) = setup();
        // free <= x and free >= 0: two candidates
        let guard = vec![Rel::le(t(), x()), Rel::ge(t(), Expr::zero())];
        let combos = find_instantiations_for_temp_vars(&vars, &guard);
        assert_eq!(combos.len(), 2);
        assert!(combos.iter().any(|s| s.get(&2) == Some(&x())));
        assert!(combos.iter().any(|s| s.get(&2) == Some(&Expr::zero())));
    }

    #[test]
    fn no_temporaries_means_no_instantiations() {
        let (vars, _) = setup();
        let guard = vec![Rel::gt(x(), Expr::zero())];
        assert!(find_instantiations_for_temp_vars(&vars, &guard).is_empty());
    }
}
