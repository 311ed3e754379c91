//! Asymptotic lower-bound certification.
//!
//! Given a guard `G` and cost `c`, decide the largest class `K` such that
//! for every bound `B` some model of `G` makes `c >= B`. Every variable
//! is replaced by a linear template `a*n + b` in a fresh parameter `n`;
//! each guard atom then becomes a polynomial in `n` whose coefficient
//! vector must make the atom hold for all large `n`, and the cost's
//! growth in `n` is maximised by a descending search over its degree.
//! All solver answers here must be proven `sat`; this check is the
//! soundness-critical final step.

use indexmap::IndexSet;
use num::Signed;
use tracing::debug;

use loris_ir::expr::{Expr, Subs};
use loris_ir::rel::{CmpOp, Guard};
use loris_ir::variables::VarId;
use loris_ir::{Complexity, ItsProblem};
use loris_smt::encode::{Encoder, PowPolicy};
use loris_smt::{SmtOracle, SmtTerm};

/// Result of the asymptotic check; monotone in the sense that a lower
/// class is returned whenever a higher one is not witnessable.
#[derive(Debug, Clone)]
pub struct AsymptoticBound {
    pub cpx: Complexity,
    pub cost: Expr,
    pub reduced_cpx: Complexity,
    pub reason: String,
}

impl AsymptoticBound {
    fn new(cpx: Complexity, cost: Expr, reason: &str) -> Self {
        AsymptoticBound {
            cpx,
            cost,
            // Linear templates grow the witnessing models linearly in the
            // parameter, so the class needs no downscaling.
            reduced_cpx: cpx,
            reason: reason.to_string(),
        }
    }

    fn unknown(reason: &str) -> Self {
        Self::new(Complexity::Unknown, Expr::zero(), reason)
    }
}

/// Decides the asymptotic class of `cost` under `guard`.
pub fn determine_complexity(
    its: &ItsProblem,
    oracle: &SmtOracle,
    guard: &Guard,
    cost: &Expr,
) -> AsymptoticBound {
    if contains_infty(cost) {
        if oracle.proven_sat(&guard.atoms, &its.vars) {
            return AsymptoticBound::new(Complexity::Infty, Expr::Infty, "unbounded cost");
        }
        return AsymptoticBound::unknown("infinite cost with unprovable guard");
    }

    match LimitProblem::build(its, guard, cost) {
        Some(problem) => problem.solve(oracle, its, guard, cost),
        None => {
            // The guard is not polynomial; fall back to plain
            // satisfiability for a constant bound.
            constant_fallback(its, oracle, guard, cost)
        }
    }
}

fn constant_fallback(
    its: &ItsProblem,
    oracle: &SmtOracle,
    guard: &Guard,
    cost: &Expr,
) -> AsymptoticBound {
    if oracle.proven_sat(&guard.atoms, &its.vars) {
        AsymptoticBound::new(Complexity::Const, cost.clone(), "satisfiable guard")
    } else {
        AsymptoticBound::unknown("guard not proven satisfiable")
    }
}

fn contains_infty(e: &Expr) -> bool {
    match e {
        Expr::Infty => true,
        Expr::Num(_) | Expr::Var(_) => false,
        Expr::Add(ts) | Expr::Mul(ts) => ts.iter().any(contains_infty),
        Expr::Pow(b, x) => contains_infty(b) || contains_infty(x),
    }
}

/// One exponential summand of the cost: `coeff * base^exponent` with a
/// constant base and a variable exponent.
struct ExpTerm {
    coeff_coeffs: Vec<SmtTerm>,
    exp_coeffs: Vec<SmtTerm>,
}

struct LimitProblem {
    /// Encoded template-variable names (for declarations).
    names: Vec<String>,
    /// Guard atoms as eventually-true constraints.
    guard_terms: Vec<SmtTerm>,
    /// `a = 0` pins for program-variable slopes.
    program_pins: Vec<SmtTerm>,
    /// Coefficients of `n^j` in the polynomial part of the cost.
    cost_coeffs: Vec<SmtTerm>,
    exp_terms: Vec<ExpTerm>,
}

impl LimitProblem {
    fn build(its: &ItsProblem, guard: &Guard, cost: &Expr) -> Option<LimitProblem> {
        let mut vars = its.vars.clone();
        let mut used: IndexSet<VarId> = IndexSet::new();
        guard.collect_vars(&mut used);
        cost.collect_vars(&mut used);

        let n = vars.fresh("n!", true);
        let mut template = Subs::new();
        let mut names = Vec::new();
        let mut program_pins_vars = Vec::new();
        for &v in &used {
            let a = vars.fresh(&format!("a!{}", its.vars.name(v)), true);
            let b = vars.fresh(&format!("b!{}", its.vars.name(v)), true);
            names.push(vars.name(a).to_string());
            names.push(vars.name(b).to_string());
            template.insert(v, Expr::var(a) * Expr::var(n) + Expr::var(b));
            if !its.vars.is_temp(v) {
                program_pins_vars.push(a);
            }
        }

        let mut enc = Encoder::new(&vars, PowPolicy::Reject);

        let mut guard_terms = Vec::new();
        for atom in guard.iter() {
            let normalized = atom.normalize();
            let poly = normalized.lhs.subs(&template);
            let coeffs = encode_coeffs(&mut enc, &poly, n)?;
            let term = match normalized.op {
                CmpOp::Eq => SmtTerm::and(
                    coeffs.iter().map(|c| c.clone().eq(SmtTerm::int(0))).collect(),
                ),
                _ => eventually_positive(&coeffs),
            };
            guard_terms.push(term);
        }

        // Split the cost into its polynomial part and exponential
        // summands with constant positive bases.
        let expanded = cost.expand();
        let terms: Vec<Expr> = match expanded {
            Expr::Add(ts) => ts,
            other => vec![other],
        };
        let mut poly_part = Vec::new();
        let mut exp_parts = Vec::new();
        for term in terms {
            if term.is_polynomial() {
                poly_part.push(term);
            } else {
                exp_parts.push(split_exp_term(term)?);
            }
        }

        let poly_subst = Expr::add(poly_part).subs(&template);
        let cost_coeffs = encode_coeffs(&mut enc, &poly_subst, n)?;

        let mut exp_terms = Vec::new();
        for (coeff, base, exponent) in exp_parts {
            if !base.is_positive() {
                return None;
            }
            let coeff_coeffs = encode_coeffs(&mut enc, &coeff.subs(&template), n)?;
            let exp_coeffs = encode_coeffs(&mut enc, &exponent.subs(&template), n)?;
            exp_terms.push(ExpTerm {
                coeff_coeffs,
                exp_coeffs,
            });
        }

        let program_pins = program_pins_vars
            .into_iter()
            .map(|a| SmtTerm::var(vars.name(a)).eq(SmtTerm::int(0)))
            .collect();

        names.extend(enc.aux_vars.iter().cloned());
        Some(LimitProblem {
            names,
            guard_terms,
            program_pins,
            cost_coeffs,
            exp_terms,
        })
    }

    /// Grows-without-bound condition for the polynomial cost part.
    fn poly_growth(&self) -> Option<SmtTerm> {
        if self.cost_coeffs.len() < 2 {
            return None;
        }
        let mut options = Vec::new();
        for d in (1..self.cost_coeffs.len()).rev() {
            options.push(leading_positive(&self.cost_coeffs, d));
        }
        Some(SmtTerm::or(options))
    }

    /// Grows-without-bound condition through some exponential summand:
    /// its exponent grows, its coefficient is eventually positive, and
    /// every other exponential summand is eventually non-negative.
    fn exp_growth(&self) -> Option<SmtTerm> {
        if self.exp_terms.is_empty() {
            return None;
        }
        let mut options = Vec::new();
        for (i, term) in self.exp_terms.iter().enumerate() {
            let mut parts = vec![
                growth_in_n(&term.exp_coeffs)?,
                eventually_positive(&term.coeff_coeffs),
            ];
            for (j, other) in self.exp_terms.iter().enumerate() {
                if i != j {
                    parts.push(eventually_nonnegative(&other.coeff_coeffs));
                }
            }
            options.push(SmtTerm::and(parts));
        }
        Some(SmtTerm::or(options))
    }

    /// Side condition making dropped exponential summands sound in a
    /// polynomial probe: each must be eventually non-negative.
    fn exp_nonneg(&self) -> Vec<SmtTerm> {
        self.exp_terms
            .iter()
            .map(|t| eventually_nonnegative(&t.coeff_coeffs))
            .collect()
    }

    fn solve(
        &self,
        oracle: &SmtOracle,
        its: &ItsProblem,
        guard: &Guard,
        cost: &Expr,
    ) -> AsymptoticBound {
        // Infty: the cost grows although every program variable is
        // pinned to a constant; only temporaries move with n.
        let mut grow_options = Vec::new();
        if let Some(t) = self.poly_growth() {
            grow_options.push(SmtTerm::and(
                std::iter::once(t).chain(self.exp_nonneg()).collect(),
            ));
        }
        if let Some(t) = self.exp_growth() {
            grow_options.push(t);
        }
        if !grow_options.is_empty() {
            let mut terms = self.guard_terms.clone();
            terms.extend(self.program_pins.iter().cloned());
            terms.push(SmtTerm::or(grow_options.clone()));
            if oracle.check_terms(&terms, &self.names).is_sat() {
                return AsymptoticBound::new(
                    Complexity::Infty,
                    cost.clone(),
                    "cost is unbounded for bounded program variables",
                );
            }
        }

        // Exp: some exponential summand grows.
        if let Some(t) = self.exp_growth() {
            let mut terms = self.guard_terms.clone();
            terms.push(t);
            if oracle.check_terms(&terms, &self.names).is_sat() {
                return AsymptoticBound::new(Complexity::Exp, cost.clone(), "exponential growth");
            }
        }

        // Poly: maximise the degree of the polynomial part.
        for d in (1..self.cost_coeffs.len()).rev() {
            let mut terms = self.guard_terms.clone();
            terms.push(leading_positive(&self.cost_coeffs, d));
            terms.extend(self.exp_nonneg());
            if oracle.check_terms(&terms, &self.names).is_sat() {
                debug!(degree = d, "polynomial witness found");
                return AsymptoticBound::new(
                    Complexity::Poly(d as u32),
                    cost.clone(),
                    "polynomial growth",
                );
            }
        }

        constant_fallback(its, oracle, guard, cost)
    }
}

/// Coefficients of `n^0, n^1, ...` of `poly`, each encoded as a term.
/// Rational coefficients are scaled integral first; sign conditions are
/// invariant under the positive factor.
fn encode_coeffs(enc: &mut Encoder<'_>, poly: &Expr, n: VarId) -> Option<Vec<SmtTerm>> {
    let coeffs = poly.poly_coeffs(n)?;
    coeffs
        .iter()
        .map(|c| enc.encode_expr(&loris_smt::encode::clear_denominators(c)))
        .collect()
}

/// `coeffs[d] > 0` and everything above is zero.
fn leading_positive(coeffs: &[SmtTerm], d: usize) -> SmtTerm {
    let mut parts = vec![coeffs[d].clone().gt(SmtTerm::int(0))];
    for c in &coeffs[d + 1..] {
        parts.push(c.clone().eq(SmtTerm::int(0)));
    }
    SmtTerm::and(parts)
}

/// The polynomial is eventually strictly positive.
fn eventually_positive(coeffs: &[SmtTerm]) -> SmtTerm {
    let options = (0..coeffs.len())
        .map(|d| leading_positive(coeffs, d))
        .collect();
    SmtTerm::or(options)
}

/// The polynomial is eventually non-negative (positive or identically
/// zero).
fn eventually_nonnegative(coeffs: &[SmtTerm]) -> SmtTerm {
    let all_zero = SmtTerm::and(
        coeffs
            .iter()
            .map(|c| c.clone().eq(SmtTerm::int(0)))
            .collect(),
    );
    SmtTerm::or(vec![eventually_positive(coeffs), all_zero])
}

/// The polynomial has degree >= 1 in `n` with positive leading term.
fn growth_in_n(coeffs: &[SmtTerm]) -> Option<SmtTerm> {
    if coeffs.len() < 2 {
        return None;
    }
    let options = (1..coeffs.len())
        .map(|d| leading_positive(coeffs, d))
        .collect();
    Some(SmtTerm::or(options))
}

/// Splits an expanded non-polynomial product into
/// `(coefficient, base, exponent)` for a constant-base power. Returns
/// `None` for anything else (variable bases, nested exponents).
fn split_exp_term(term: Expr) -> Option<(Expr, num::BigRational, Expr)> {
    let factors: Vec<Expr> = match term {
        Expr::Mul(fs) => fs,
        other => vec![other],
    };
    let mut coeff = Vec::new();
    let mut power: Option<(num::BigRational, Expr)> = None;
    for f in factors {
        match f {
            Expr::Pow(base, exp) if !exp.is_polynomial() || exp.as_int().is_none() => {
                if power.is_some() {
                    return None;
                }
                let r = base.as_num()?.clone();
                power = Some((r, *exp));
            }
            other if other.is_polynomial() => coeff.push(other),
            _ => return None,
        }
    }
    let (base, exponent) = power?;
    if !exponent.is_polynomial() {
        return None;
    }
    Some((Expr::mul(coeff), base, exponent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loris_ir::rel::Rel;

    fn setup() -> (ItsProblem, SmtOracle) {
        let mut its = ItsProblem::new();
        its.vars.intern("x");
        its.vars.intern("y");
        its.vars.fresh("free", true);
        (its, SmtOracle::new(0))
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

    #[test]
    fn linear_cost_under_open_guard_is_linear() {
        let (its, oracle) = setup();
        let guard = Guard::single(Rel::gt(x(), Expr::zero()));
        let res = determine_complexity(&its, &oracle, &guard, &x());
        assert_eq!(res.cpx, Complexity::Poly(1));
        assert_eq!(res.reduced_cpx, Complexity::Poly(1));
    }

    #[test]
    fn quadratic_cost_is_witnessed() {
        let (its, oracle) = setup();
        let guard = Guard::single(Rel::gt(x(), Expr::zero()));
        let cost = Expr::pow(x(), Expr::int(2)) + x();
        let res = determine_complexity(&its, &oracle, &guard, &cost);
        assert_eq!(res.cpx, Complexity::Poly(2));
    }

    #[test]
    fn upper_bounded_variables_only_yield_constants() {
        let (its, oracle) = setup();
        // 0 < x < 5 admits only finitely many values for x
        let guard = Guard::from_atoms(vec![
            Rel::gt(x(), Expr::zero()),
            Rel::lt(x(), Expr::int(5)),
        ]);
        let res = determine_complexity(&its, &oracle, &guard, &x());
        assert_eq!(res.cpx, Complexity::Const);
    }

    #[test]
    fn contradictory_guard_gives_unknown() {
        let (its, oracle) = setup();
        let guard = Guard::from_atoms(vec![
            Rel::gt(x(), Expr::zero()),
            Rel::lt(x(), Expr::zero()),
        ]);
        let res = determine_complexity(&its, &oracle, &guard, &x());
        assert_eq!(res.cpx, Complexity::Unknown);
    }

    #[test]
    fn unbounded_temporary_cost_is_infinite() {
        let (its, oracle) = setup();
        // cost = free * x: bounded inputs, unbounded temporary
        let guard = Guard::from_atoms(vec![
            Rel::gt(x(), Expr::zero()),
            Rel::gt(t(), Expr::zero()),
        ]);
        let res = determine_complexity(&its, &oracle, &guard, &(t() * x()));
        assert_eq!(res.cpx, Complexity::Infty);
    }

    #[test]
    fn program_variable_cost_is_not_infinite() {
        let (its, oracle) = setup();
        let guard = Guard::single(Rel::gt(x(), Expr::zero()));
        let res = determine_complexity(&its, &oracle, &guard, &(x() * y()));
        assert_eq!(res.cpx, Complexity::Poly(2));
    }

    #[test]
    fn exponential_cost_is_witnessed() {
        let (its, oracle) = setup();
        let guard = Guard::single(Rel::gt(x(), Expr::zero()));
        let cost = Expr::pow(Expr::int(2), x());
        let res = determine_complexity(&its, &oracle, &guard, &cost);
        assert_eq!(res.cpx, Complexity::Exp);
    }

    #[test]
    fn infinite_cost_symbol_needs_a_satisfiable_guard() {
        let (its, oracle) = setup();
        let guard = Guard::single(Rel::gt(x(), Expr::zero()));
        let res = determine_complexity(&its, &oracle, &guard, &Expr::Infty);
        assert_eq!(res.cpx, Complexity::Infty);

        let unsat = Guard::from_atoms(vec![
            Rel::gt(x(), Expr::zero()),
            Rel::lt(x(), Expr::zero()),
        ]);
        let res = determine_complexity(&its, &oracle, &unsat, &Expr::Infty);
        assert_eq!(res.cpx, Complexity::Unknown);
    }

    #[test]
    fn guard_capped_growth_downgrades_the_class() {
        let (its, oracle) = setup();
        // y > 0 but y < 10: quadratic x*y collapses to linear growth
        let guard = Guard::from_atoms(vec![
            Rel::gt(x(), Expr::zero()),
            Rel::gt(y(), Expr::zero()),
            Rel::lt(y(), Expr::int(10)),
        ]);
        let res = determine_complexity(&its, &oracle, &guard, &(x() * y()));
        assert_eq!(res.cpx, Complexity::Poly(1));
    }
}
