//! Rule simplification: trivial-atom removal, equality propagation,
//! temporary-variable elimination, trivial-update removal, and SMT-backed
//! removal of implied guard atoms. Every function returns whether it
//! changed anything and never fails.

use indexmap::IndexSet;
use num::One;

use loris_ir::expr::{Expr, Numeric, Subs};
use loris_ir::rel::{CmpOp, Rel};
use loris_ir::rule::Rule;
use loris_ir::variables::{VarId, VariableManager};
use loris_smt::SmtOracle;

/// Full preprocessing of a single rule. The cheap passes feed each other
/// (temp-var elimination can leave trivial atoms behind), so they run to
/// a fixpoint before the SMT-backed pass.
pub fn simplify_rule(vars: &VariableManager, oracle: &SmtOracle, rule: &mut Rule) -> bool {
    let mut changed = false;
    loop {
        let mut round = remove_trivial_guards(rule);
        round |= propagate_equalities(vars, rule);
        round |= eliminate_temp_vars(vars, rule);
        round |= remove_trivial_updates(rule);
        if !round {
            break;
        }
        changed = true;
    }
    changed |= remove_weaker_guards(vars, oracle, rule);
    changed
}

/// Drops guard atoms that hold for every assignment (`42 >= 0`,
/// `x <= x + 1`).
pub fn remove_trivial_guards(rule: &mut Rule) -> bool {
    let before = rule.guard.len();
    rule.guard.atoms.retain(|atom| !atom.is_trivially_true());
    rule.guard.len() != before
}

/// Drops updates of the form `x := x`.
pub fn remove_trivial_updates(rule: &mut Rule) -> bool {
    let mut changed = false;
    for rhs in &mut rule.rhss {
        let identities: Vec<VarId> = rhs
            .update
            .iter()
            .filter(|(v, e)| matches!(e, Expr::Var(w) if w == *v))
            .map(|(v, _)| *v)
            .collect();
        for v in identities {
            rhs.update.remove(v);
            changed = true;
        }
    }
    changed
}

/// Substitutes guard equalities that can be solved for a temporary
/// variable with coefficient ±1, dropping the equality.
pub fn propagate_equalities(vars: &VariableManager, rule: &mut Rule) -> bool {
    let mut changed = false;
    loop {
        let mut solved: Option<(usize, VarId, Expr)> = None;
        for (idx, atom) in rule.guard.iter().enumerate() {
            if !atom.is_equality() {
                continue;
            }
            if let Some((var, solution)) = solve_for_temp(vars, atom) {
                solved = Some((idx, var, solution));
                break;
            }
        }
        let Some((idx, var, solution)) = solved else {
            return changed;
        };
        rule.guard.atoms.remove(idx);
        let mut subs = Subs::new();
        subs.insert(var, solution);
        *rule = rule.subs(&subs);
        changed = true;
    }
}

/// Solves `atom` (an equality) for some temporary variable occurring
/// linearly with coefficient ±1.
fn solve_for_temp(vars: &VariableManager, atom: &Rel) -> Option<(VarId, Expr)> {
    let diff = atom.lhs.clone() - atom.rhs.clone();
    let (coeffs, constant) = diff.lin_coeffs()?;
    let (&var, coeff) = coeffs
        .iter()
        .find(|(v, c)| vars.is_temp(**v) && is_unit(c))?;
    // diff = coeff*var + rest = 0  =>  var = -rest / coeff
    let mut rest_terms: Vec<Expr> = coeffs
        .iter()
        .filter(|(v, _)| **v != var)
        .map(|(v, c)| Expr::num(c.clone()) * Expr::var(*v))
        .collect();
    rest_terms.push(Expr::num(constant));
    let rest = Expr::add(rest_terms);
    let solution = if coeff.is_one() { -rest } else { rest };
    Some((var, solution))
}

fn is_unit(c: &Numeric) -> bool {
    c.is_one() || (-c.clone()).is_one()
}

/// Eliminates temporaries that occur only in guard inequalities by
/// transitive closure: `a <= t` and `t <= b` become `a <= b`; one-sided
/// bounds vanish entirely (the temporary is existentially quantified).
pub fn eliminate_temp_vars(vars: &VariableManager, rule: &mut Rule) -> bool {
    let mut guard_only: IndexSet<VarId> = IndexSet::new();
    rule.guard.collect_vars(&mut guard_only);
    guard_only.retain(|v| vars.is_temp(*v));
    let mut elsewhere = IndexSet::new();
    rule.cost.collect_vars(&mut elsewhere);
    for rhs in &rule.rhss {
        rhs.update.collect_rhs_vars(&mut elsewhere);
    }
    guard_only.retain(|v| !elsewhere.contains(v));

    let mut changed = false;
    'vars: for &t in &guard_only {
        let mut lowers: Vec<Expr> = Vec::new();
        let mut uppers: Vec<Expr> = Vec::new();
        let mut others: Vec<Rel> = Vec::new();
        for atom in rule.guard.iter() {
            if !atom.has_var(t) {
                others.push(atom.clone());
                continue;
            }
            if atom.is_equality() {
                continue 'vars; // handled by equality propagation
            }
            let le = atom.to_le();
            let diff = le.lhs.clone() - le.rhs.clone();
            let Some((coeffs, constant)) = diff.lin_coeffs() else {
                continue 'vars;
            };
            let Some(c) = coeffs.get(&t) else {
                // occurrences cancelled out; the atom does not constrain t
                others.push(atom.clone());
                continue;
            };
            if !is_unit(c) {
                continue 'vars;
            }
            let mut rest_terms: Vec<Expr> = coeffs
                .iter()
                .filter(|(v, _)| **v != t)
                .map(|(v, cf)| Expr::num(cf.clone()) * Expr::var(*v))
                .collect();
            rest_terms.push(Expr::num(constant.clone()));
            let rest = Expr::add(rest_terms);
            if c.is_one() {
                // t + rest <= 0  =>  t <= -rest
                uppers.push(-rest);
            } else {
                // -t + rest <= 0  =>  rest <= t
                lowers.push(rest);
            }
        }
        if lowers.is_empty() && uppers.is_empty() {
            continue;
        }
        for lo in &lowers {
            for up in &uppers {
                others.push(Rel::le(lo.clone(), up.clone()));
            }
        }
        rule.guard.atoms = others;
        changed = true;
    }
    changed
}

/// Drops guard atoms that are provably implied by another single atom
/// (`x >= 0` next to `x > 0`). Involves one SMT query per ordered pair.
pub fn remove_weaker_guards(vars: &VariableManager, oracle: &SmtOracle, rule: &mut Rule) -> bool {
    let mut remove: IndexSet<usize> = IndexSet::new();
    let atoms = &rule.guard.atoms;
    for i in 0..atoms.len() {
        if remove.contains(&i) {
            continue;
        }
        for j in 0..atoms.len() {
            if i == j || remove.contains(&j) || atoms[i] == atoms[j] {
                continue;
            }
            if oracle.implies(std::slice::from_ref(&atoms[i]), &atoms[j], vars) {
                remove.insert(j);
            }
        }
    }
    if remove.is_empty() {
        return false;
    }
    let mut idx = 0;
    rule.guard.atoms.retain(|_| {
        let keep = !remove.contains(&idx);
        idx += 1;
        keep
    });
    true
}

/// Removes a trailing `cost >= 0` guard atom when the rest of the guard
/// already implies it.
pub fn try_to_remove_cost(vars: &VariableManager, oracle: &SmtOracle, rule: &mut Rule) -> bool {
    let Some(last) = rule.guard.atoms.last() else {
        return false;
    };
    let is_cost_atom = last.op == CmpOp::Ge
        && (last.lhs.clone() - last.rhs.clone()).expand() == rule.cost.clone().expand();
    if !is_cost_atom {
        return false;
    }
    let rest = &rule.guard.atoms[..rule.guard.len() - 1];
    let last = last.clone();
    if oracle.implies(rest, &last, vars) {
        rule.guard.atoms.pop();
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use loris_ir::rel::Guard;
    use loris_ir::rule::Update;

    fn setup() -> (VariableManager, SmtOracle) {
        let mut vars = VariableManager::new();
        vars.intern("x");
        vars.intern("y");
        vars.fresh("free", true);
        (vars, SmtOracle::new(0))
    }

    fn x() -> Expr {
        Expr::var(0)
    }

    fn y() -> Expr {
        Expr::var(1)
    }

    fn t() -> Expr {
        Expr::var(2)
    }

    fn rule_with_guard(atoms: Vec<Rel>) -> Rule {
        Rule::linear(0, Guard::from_atoms(atoms), Expr::one(), 0, Update::new())
    }

    #[test]
    fn trivial_guards_are_dropped() {
        let mut rule = rule_with_guard(vec![
            Rel::ge(Expr::int(5), Expr::zero()),
            Rel::gt(x(), Expr::zero()),
            Rel::le(x(), x() + Expr::one()),
        ]);
        assert!(remove_trivial_guards(&mut rule));
        assert_eq!(rule.guard.len(), 1);
        assert_eq!(rule.guard.atoms[0], Rel::gt(x(), Expr::zero()));
    }

    #[test]
    fn identity_updates_are_dropped() {
        let mut update = Update::new();
        update.set(0, x());
        update.set(1, x() + Expr::one());
        let mut rule = Rule::linear(0, Guard::trivial(), Expr::one(), 0, update);
        assert!(remove_trivial_updates(&mut rule));
        assert!(!rule.update().updates(0));
        assert!(rule.update().updates(1));
    }

    #[test]
    fn equalities_on_temps_are_propagated() {
        let (vars, _) = setup();
        // free == y + 1, x > free  ~>  x > y + 1
        let mut rule = rule_with_guard(vec![
            Rel::eq(t(), y() + Expr::one()),
            Rel::gt(x(), t()),
        ]);
        rule.cost = t();
        assert!(propagate_equalities(&vars, &mut rule));
        assert_eq!(rule.guard.len(), 1);
        assert_eq!(rule.guard.atoms[0], Rel::gt(x(), y() + Expr::one()));
        assert_eq!(rule.cost, y() + Expr::one());
    }

    #[test]
    fn program_variable_equalities_are_kept() {
        let (vars, _) = setup();
        let mut rule = rule_with_guard(vec![Rel::eq(x(), y())]);
        assert!(!propagate_equalities(&vars, &mut rule));
        assert_eq!(rule.guard.len(), 1);
    }

    #[test]
    fn bounded_temp_vars_collapse_to_transitive_constraints() {
        let (vars, _) = setup();
        // x <= free, free <= y  ~>  x <= y
        let mut rule = rule_with_guard(vec![Rel::le(x(), t()), Rel::le(t(), y())]);
        assert!(eliminate_temp_vars(&vars, &mut rule));
        assert_eq!(rule.guard.len(), 1);
        assert_eq!(rule.guard.atoms[0], Rel::le(x(), y()));
    }

    #[test]
    fn one_sided_temp_bounds_vanish() {
        let (vars, _) = setup();
        let mut rule = rule_with_guard(vec![Rel::ge(t(), x())]);
        assert!(eliminate_temp_vars(&vars, &mut rule));
        assert!(rule.guard.is_empty());
    }

    #[test]
    fn temps_used_in_cost_are_left_alone() {
        let (vars, _) = setup();
        let mut rule = rule_with_guard(vec![Rel::ge(t(), x())]);
        rule.cost = t();
        assert!(!eliminate_temp_vars(&vars, &mut rule));
        assert_eq!(rule.guard.len(), 1);
    }

    #[test]
    fn weaker_guards_are_removed_via_smt() {
        let (vars, oracle) = setup();
        let mut rule = rule_with_guard(vec![
            Rel::gt(x(), Expr::zero()),
            Rel::ge(x(), Expr::zero()),
        ]);
        assert!(remove_weaker_guards(&vars, &oracle, &mut rule));
        assert_eq!(rule.guard.len(), 1);
        assert_eq!(rule.guard.atoms[0], Rel::gt(x(), Expr::zero()));
    }

    #[test]
    fn implied_cost_atom_is_removed() {
        let (vars, oracle) = setup();
        // guard: x > 2, x >= 0 (cost atom, cost = x)
        let mut rule = rule_with_guard(vec![
            Rel::gt(x(), Expr::int(2)),
            Rel::ge(x(), Expr::zero()),
        ]);
        rule.cost = x();
        assert!(try_to_remove_cost(&vars, &oracle, &mut rule));
        assert_eq!(rule.guard.len(), 1);
    }

    #[test]
    fn unimplied_cost_atom_stays() {
        let (vars, oracle) = setup();
        let mut rule = rule_with_guard(vec![
            Rel::gt(y(), Expr::zero()),
            Rel::ge(x(), Expr::zero()),
        ]);
        rule.cost = x();
        assert!(!try_to_remove_cost(&vars, &oracle, &mut rule));
        assert_eq!(rule.guard.len(), 2);
    }
}
