//! Farkas' lemma as an SMT encoding.
//!
//! For a system of linear constraints `A·x <= b`, the implication
//! `A·x <= b  ==>  c·x + c0 <= delta` holds iff there are multipliers
//! `lambda >= 0` with `lambdaᵀ·A = c` and `lambdaᵀ·b <= delta - c0`.
//! The template coefficients `c` are themselves solver unknowns here, so
//! the equation system stays linear in `lambda` and `c` separately but is
//! solved as one query.

use num::{BigInt, Integer, ToPrimitive, Zero};

use loris_ir::expr::Numeric;
use loris_smt::SmtTerm;

/// One row `sum(coeffs[i] * x_col) <= bound` over column indices.
#[derive(Debug, Clone, Default)]
pub struct LinearConstraint {
    pub coeffs: Vec<(usize, Numeric)>,
    pub bound: Numeric,
}

impl LinearConstraint {
    /// Scales the row by the least common denominator so that every
    /// number is an integer. Sound because the factor is positive.
    fn integral(&self) -> Option<(Vec<(usize, BigInt)>, BigInt)> {
        let mut lcm = self.bound.denom().clone();
        for (_, c) in &self.coeffs {
            lcm = lcm.lcm(c.denom());
        }
        let scale = Numeric::from_integer(lcm);
        let coeffs = self
            .coeffs
            .iter()
            .map(|(col, c)| ((*col), (c * &scale).to_integer()))
            .collect();
        let bound = (&self.bound * &scale).to_integer();
        Some((coeffs, bound))
    }
}

/// Generates fresh multiplier names within one metering query.
#[derive(Debug, Default)]
pub struct FreshLambdas {
    counter: usize,
    pub names: Vec<String>,
}

impl FreshLambdas {
    pub fn next(&mut self) -> String {
        let name = format!("lam!{}", self.counter);
        self.counter += 1;
        self.names.push(name.clone());
        name
    }
}

/// Encodes `constraints ==> sum(coeff_terms[col] * x_col) + c0 <= delta`.
///
/// `coeff_terms` maps each column to its template coefficient term;
/// columns without an entry get the implicit coefficient 0. Returns
/// `None` when a constraint coefficient does not fit a machine integer.
pub fn apply(
    constraints: &[LinearConstraint],
    num_cols: usize,
    coeff_terms: &[(usize, SmtTerm)],
    c0: SmtTerm,
    delta: i64,
    lambdas: &mut FreshLambdas,
) -> Option<SmtTerm> {
    let mut rows = Vec::with_capacity(constraints.len());
    let mut lambda_names = Vec::with_capacity(constraints.len());
    for constraint in constraints {
        rows.push(constraint.integral()?);
        lambda_names.push(lambdas.next());
    }

    let mut conjuncts = Vec::new();

    // lambda >= 0
    for name in &lambda_names {
        conjuncts.push(SmtTerm::var(name.clone()).ge(SmtTerm::int(0)));
    }

    // lambdaᵀ·A = c, one equation per column
    for col in 0..num_cols {
        let mut sum = Vec::new();
        for (row, (coeffs, _)) in rows.iter().enumerate() {
            if let Some((_, a)) = coeffs.iter().find(|(c, _)| *c == col) {
                if a.is_zero() {
                    continue;
                }
                sum.push(SmtTerm::var(lambda_names[row].clone()).mul(SmtTerm::int(a.to_i64()?)));
            }
        }
        let target = coeff_terms
            .iter()
            .find(|(c, _)| *c == col)
            .map(|(_, t)| t.clone())
            .unwrap_or(SmtTerm::int(0));
        conjuncts.push(SmtTerm::sum(sum).eq(target));
    }

    // lambdaᵀ·b <= delta - c0
    let mut bound_sum = Vec::new();
    for (row, (_, bound)) in rows.iter().enumerate() {
        if bound.is_zero() {
            continue;
        }
        bound_sum.push(SmtTerm::var(lambda_names[row].clone()).mul(SmtTerm::int(bound.to_i64()?)));
    }
    conjuncts.push(SmtTerm::sum(bound_sum).le(SmtTerm::int(delta).sub(c0)));

    Some(SmtTerm::and(conjuncts))
}
