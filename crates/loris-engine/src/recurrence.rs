//! Closed forms for iterated updates and costs.
//!
//! Given a self-loop update `U` and a metering function `m`, every
//! updated variable `v` satisfies `v(n) = U[v](v(n-1), ...)` with
//! `v(0) = v`; the loop's cost satisfies `c(n) = c(n-1) + cost(n)` with
//! `c(0) = 0`. The built-in solver handles first-order recurrences with a
//! constant homogeneous coefficient, polynomial inhomogeneities up to
//! degree three, and geometric inhomogeneities; anything else is a
//! failure and the loop stays un-accelerated.

use indexmap::IndexSet;
use num::{One, Signed, ToPrimitive, Zero};

use loris_ir::expr::{rational, Expr, Numeric, Subs};
use loris_ir::rel::Rel;
use loris_ir::rule::{Rule, Update};
use loris_ir::variables::VarId;

/// Oracle interface for recurrence solving, so the engine can be driven
/// by a scripted solver in tests.
pub trait RecurrenceSolver {
    /// Closed form of `x(n) = a * x(n-1) + q(n)`, `x(0) = x0`, where the
    /// recurrence is given by its right-hand side over `n` and the
    /// previous value `prev`.
    fn solve(&self, rhs: &Expr, prev: VarId, x0: &Expr, n: VarId) -> Option<Expr>;
}

/// The default solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosedFormSolver;

impl RecurrenceSolver for ClosedFormSolver {
    fn solve(&self, rhs: &Expr, prev: VarId, x0: &Expr, n: VarId) -> Option<Expr> {
        // Decompose rhs = a * prev + q with a constant and q free of prev.
        let coeffs = rhs.poly_coeffs(prev)?;
        if coeffs.len() > 2 {
            return None;
        }
        let q = coeffs[0].clone();
        let a = match coeffs.get(1) {
            None => Numeric::zero(),
            Some(c) => c.as_num()?.clone(),
        };

        if a.is_zero() {
            // The previous value is forgotten every step, so for n >= 1
            // the iterate is just the inhomogeneity at n. Accelerated
            // rules always guard `m >= 1`, which keeps this valid.
            return Some(q);
        }
        if a.is_one() {
            // x(n) = x0 + sum_{k=1..n} q(k)
            let sum = sum_from_1_to_n(&q, n)?;
            return Some(x0.clone() + sum);
        }
        // Constant coefficient a != 1 with n-free inhomogeneity:
        // x(n) = a^n * x0 + q * (a^n - 1) / (a - 1)
        if q.has_var(n) {
            return None;
        }
        let a_pow_n = Expr::pow(Expr::num(a.clone()), Expr::var(n));
        let scale = Expr::num(Numeric::one() / (a - Numeric::one()));
        Some(
            a_pow_n.clone() * x0.clone()
                + q * (a_pow_n - Expr::one()) * scale,
        )
    }
}

/// `sum_{k=1..n} q(k)` where the summation index is the variable `n`
/// itself (each term is evaluated at `k`). Handles polynomial terms up to
/// degree three and geometric terms `coeff * r^(s*n + e)`.
pub fn sum_from_1_to_n(q: &Expr, n: VarId) -> Option<Expr> {
    let expanded = q.expand();
    let terms: Vec<Expr> = match expanded {
        Expr::Add(ts) => ts,
        other => vec![other],
    };
    let mut out = Vec::with_capacity(terms.len());
    for term in terms {
        out.push(sum_term(&term, n)?);
    }
    Some(Expr::add(out))
}

fn sum_term(term: &Expr, n: VarId) -> Option<Expr> {
    if !term.has_var(n) {
        // sum of a constant (wrt n) is term * n
        return Some(term.clone() * Expr::var(n));
    }
    if let Some(coeffs) = term.poly_coeffs(n) {
        // a single product term has exactly one non-zero degree
        let mut result = Vec::new();
        for (d, coeff) in coeffs.into_iter().enumerate() {
            if coeff.is_zero() {
                continue;
            }
            result.push(coeff * faulhaber(d as u32, n)?);
        }
        return Some(Expr::add(result));
    }
    geometric_sum(term, n)
}

/// `sum_{k=1..n} k^d` for d <= 3.
fn faulhaber(d: u32, n: VarId) -> Option<Expr> {
    let n = Expr::var(n);
    let half = Expr::num(rational(1) / rational(2));
    match d {
        0 => Some(n),
        1 => Some(half * n.clone() * (n + Expr::one())),
        2 => {
            let sixth = Expr::num(rational(1) / rational(6));
            Some(
                sixth
                    * n.clone()
                    * (n.clone() + Expr::one())
                    * (Expr::int(2) * n + Expr::one()),
            )
        }
        3 => {
            let quarter = Expr::num(rational(1) / rational(4));
            Some(
                quarter
                    * Expr::pow(n.clone(), Expr::int(2))
                    * Expr::pow(n + Expr::one(), Expr::int(2)),
            )
        }
        _ => None,
    }
}

/// `sum_{k=1..n} coeff * r^(s*k + e)` with `r` a positive rational
/// constant and integer slope `s != 0`: with `b = r^s` the sum is
/// `coeff * r^e * b * (b^n - 1) / (b - 1)`.
fn geometric_sum(term: &Expr, n: VarId) -> Option<Expr> {
    let factors: Vec<Expr> = match term.clone() {
        Expr::Mul(fs) => fs,
        other => vec![other],
    };
    let mut coeff = Vec::new();
    let mut power: Option<(Numeric, Expr)> = None;
    for f in factors {
        if !f.has_var(n) {
            coeff.push(f);
            continue;
        }
        if power.is_some() {
            return None;
        }
        let Expr::Pow(base, exp) = f else {
            return None;
        };
        let r = base.as_num()?.clone();
        if !r.is_positive() {
            return None;
        }
        power = Some((r, *exp));
    }
    let (r, exp) = power?;
    let coeffs = exp.poly_coeffs(n)?;
    if coeffs.len() != 2 {
        return None;
    }
    let slope_num = coeffs[1].as_num()?;
    if !slope_num.is_integer() {
        return None;
    }
    let slope = slope_num.to_integer().to_i32()?;
    if slope == 0 || slope.unsigned_abs() > 8 {
        return None;
    }
    let offset = coeffs[0].clone();
    let b = r.pow(slope);
    if b.is_one() {
        return None;
    }
    let b_pow_n = Expr::pow(Expr::num(b.clone()), Expr::var(n));
    let scale = Expr::num(b.clone() / (b - Numeric::one()));
    let sum = Expr::pow(Expr::num(r), offset) * scale * (b_pow_n - Expr::one());
    Some(Expr::mul(coeff) * sum)
}

/// Topological order of the updated variables along the "uses" relation.
/// Cycles are broken by asserting equality of the remaining variables in
/// `added_guard` and substituting.
pub fn dependency_order(update: &mut Update, added_guard: &mut Vec<Rel>) -> Vec<VarId> {
    let mut ordering = Vec::new();
    let mut ordered: IndexSet<VarId> = IndexSet::new();
    while ordering.len() < update.len() {
        let mut changed = false;
        let keys: Vec<VarId> = update.iter().map(|(v, _)| *v).collect();
        for v in &keys {
            if ordered.contains(v) {
                continue;
            }
            let rhs_vars = update.get(*v).expect("key").vars();
            let blocked = rhs_vars
                .iter()
                .any(|w| *w != *v && update.updates(*w) && !ordered.contains(w));
            if !blocked {
                ordered.insert(*v);
                ordering.push(*v);
                changed = true;
            }
        }
        if changed {
            continue;
        }
        // No acyclic order: assume the remaining variables are all equal.
        let mut subs = Subs::new();
        let mut target: Option<VarId> = None;
        for v in &keys {
            if ordered.contains(v) {
                continue;
            }
            match target {
                None => target = Some(*v),
                Some(t) => {
                    added_guard.push(Rel::eq(Expr::var(t), Expr::var(*v)));
                    subs.insert(*v, Expr::var(t));
                }
            }
        }
        let rewritten = update.subs_rhs(&subs);
        *update = rewritten;
    }
    ordering
}

/// Replaces the rule's update and cost by their `m`-fold iterates.
/// `n` is a scratch variable standing for the iteration count; it is
/// substituted by `m` before returning. Fails without touching the rule.
pub fn calc_iterated(
    solver: &dyn RecurrenceSolver,
    rule: &mut Rule,
    meter: &Expr,
    n: VarId,
) -> bool {
    debug_assert!(rule.is_linear());
    let mut update = rule.update().clone();
    let mut added_guard = Vec::new();
    let order = dependency_order(&mut update, &mut added_guard);

    // Recurrences of already-solved variables, shifted to n-1, for use in
    // the right-hand sides of later variables.
    let mut known_pre = Subs::new();
    let mut new_update = Update::new();
    for v in order {
        let rhs = update.get(v).expect("ordered key").subs(&known_pre);
        let Some(closed) = solver.solve(&rhs, v, &Expr::var(v), n) else {
            return false;
        };
        let shifted = closed.subs_var(n, &(Expr::var(n) - Expr::one()));
        known_pre.insert(v, shifted);
        new_update.set(v, closed.subs_var(n, meter));
    }

    // cost(n) uses the variable values before iteration n.
    let cost_at = rule.cost.subs(&known_pre);
    let Some(cost_sum) = sum_from_1_to_n(&cost_at, n) else {
        return false;
    };
    let new_cost = cost_sum.subs_var(n, meter);

    *rule.update_mut() = new_update;
    rule.cost = new_cost;
    for atom in added_guard {
        rule.guard.push(atom);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use loris_ir::rel::Guard;
    use loris_ir::variables::VariableManager;

    fn vars3() -> (VariableManager, VarId, VarId, VarId) {
        let mut vars = VariableManager::new();
        let x = vars.intern("x");
        let y = vars.intern("y");
        let n = vars.fresh("n", true);
        (vars, x, y, n)
    }

    #[test]
    fn decrement_has_linear_closed_form() {
        let (_, x, _, n) = vars3();
        let solver = ClosedFormSolver;
        // x(n) = x(n-1) - 1
        let closed = solver
            .solve(&(Expr::var(x) - Expr::one()), x, &Expr::var(x), n)
            .unwrap();
        assert_eq!(closed, Expr::var(x) - Expr::var(n));
    }

    #[test]
    fn doubling_has_geometric_closed_form() {
        let (_, x, _, n) = vars3();
        let solver = ClosedFormSolver;
        // x(n) = 2 * x(n-1)
        let closed = solver
            .solve(&(Expr::int(2) * Expr::var(x)), x, &Expr::var(x), n)
            .unwrap();
        let expected = Expr::pow(Expr::int(2), Expr::var(n)) * Expr::var(x);
        assert_eq!(closed, expected);
    }

    #[test]
    fn affine_recurrence_combines_both_parts() {
        let (_, x, _, n) = vars3();
        let solver = ClosedFormSolver;
        // x(n) = 3*x(n-1) + 1  =>  3^n*x + (3^n - 1)/2
        let closed = solver
            .solve(
                &(Expr::int(3) * Expr::var(x) + Expr::one()),
                x,
                &Expr::var(x),
                n,
            )
            .unwrap();
        // check a few concrete iterates: x=1: 1, 4, 13, 40
        let at = |k: i64| {
            closed
                .subs_var(x, &Expr::one())
                .subs_var(n, &Expr::int(k))
        };
        assert_eq!(at(0), Expr::one());
        assert_eq!(at(1), Expr::int(4));
        assert_eq!(at(2), Expr::int(13));
        assert_eq!(at(3), Expr::int(40));
    }

    #[test]
    fn polynomial_sums_use_faulhaber() {
        let (_, _, y, n) = vars3();
        // sum_{k=1..n} (y + k) = y*n + n(n+1)/2
        let sum = sum_from_1_to_n(&(Expr::var(y) + Expr::var(n)), n).unwrap();
        let expected = Expr::var(y) * Expr::var(n)
            + Expr::num(rational(1) / rational(2))
                * Expr::var(n)
                * (Expr::var(n) + Expr::one());
        assert_eq!(sum.expand(), expected.expand());
    }

    #[test]
    fn geometric_sums_telescope() {
        let (_, _, _, n) = vars3();
        // sum_{k=1..n} 2^(k-1) = 2^n - 1
        let term = Expr::pow(Expr::int(2), Expr::var(n) - Expr::one());
        let sum = sum_from_1_to_n(&term, n).unwrap();
        let expected = Expr::pow(Expr::int(2), Expr::var(n)) - Expr::one();
        assert_eq!(sum.expand(), expected.expand());
    }

    #[test]
    fn quartic_sums_are_out_of_scope() {
        let (_, _, _, n) = vars3();
        let term = Expr::pow(Expr::var(n), Expr::int(4));
        assert!(sum_from_1_to_n(&term, n).is_none());
    }

    #[test]
    fn dependency_order_resolves_uses_first() {
        let (_, x, y, _) = vars3();
        // x := y, y := y - 1: y must come before x
        let mut update = Update::new();
        update.set(x, Expr::var(y));
        update.set(y, Expr::var(y) - Expr::one());
        let mut added = Vec::new();
        let order = dependency_order(&mut update, &mut added);
        assert_eq!(order, vec![y, x]);
        assert!(added.is_empty());
    }

    #[test]
    fn dependency_cycles_add_equalities() {
        let (_, x, y, _) = vars3();
        // x := y, y := x is cyclic
        let mut update = Update::new();
        update.set(x, Expr::var(y));
        update.set(y, Expr::var(x));
        let mut added = Vec::new();
        let order = dependency_order(&mut update, &mut added);
        assert_eq!(order.len(), 2);
        assert_eq!(added.len(), 1);
        assert!(added[0].is_equality());
    }

    #[test]
    fn iterated_counting_loop() {
        let (_, x, _, n) = vars3();
        // while x > 0: x := x - 1, cost 1; meter = x
        let mut update = Update::new();
        update.set(x, Expr::var(x) - Expr::one());
        let mut rule = Rule::linear(
            0,
            Guard::single(Rel::gt(Expr::var(x), Expr::zero())),
            Expr::one(),
            0,
            update,
        );
        let meter = Expr::var(x);
        assert!(calc_iterated(&ClosedFormSolver, &mut rule, &meter, n));
        // x(m) = x - x = 0, cost = m = x
        assert_eq!(rule.update().get(x), Some(&Expr::zero()));
        assert_eq!(rule.cost, Expr::var(x));
    }

    #[test]
    fn iterated_doubling_cost_is_exponential() {
        let (_, x, y, n) = vars3();
        // while x > 0: x := x - 1, y := 2y, cost y
        let mut update = Update::new();
        update.set(x, Expr::var(x) - Expr::one());
        update.set(y, Expr::int(2) * Expr::var(y));
        let mut rule = Rule::linear(
            0,
            Guard::single(Rel::gt(Expr::var(x), Expr::zero())),
            Expr::var(y),
            0,
            update,
        );
        let meter = Expr::var(x);
        assert!(calc_iterated(&ClosedFormSolver, &mut rule, &meter, n));
        // cost = sum_{k=1..m} y*2^(k-1) = y*(2^m - 1) with m = x
        let expected =
            Expr::var(y) * (Expr::pow(Expr::int(2), Expr::var(x)) - Expr::one());
        assert_eq!(rule.cost.expand(), expected.expand());
        use loris_ir::Complexity;
        assert_eq!(rule.cost.complexity(), Complexity::Exp);
    }
}
