//! Metering-function synthesis for self-loops.
//!
//! A metering function `m` witnesses that a loop with guard `G` and
//! update `U` runs at least `m` times:
//!   - outside the guard it is non-positive (`!g ==> m <= 0` for every
//!     limiting guard atom `g`),
//!   - one iteration decreases it by at most one (`G ==> m - m[U] <= 1`),
//!   - it is enabled initially (`G ==> m >= 1`, relaxed to `m >= 0` when
//!     the strict version has no solution).
//! While `m > 0` the guard must still hold, so at least `m` iterations
//! happen; this is the direction a lower bound needs.
//!
//! The three implications are turned into linear constraints on the
//! template coefficients via Farkas' lemma and handed to the SMT oracle.

pub mod farkas;
pub mod toolbox;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use loris_ir::expr::{rational, Expr};
use loris_ir::rel::Rel;
use loris_ir::rule::{Rule, Update};
use loris_ir::variables::{VarId, VariableManager};
use loris_smt::{SmtOracle, SmtTerm};

use crate::preprocess;
use farkas::{FreshLambdas, LinearConstraint};

/// Outcome of a metering attempt. Everything except `Success` is a
/// non-error: the caller keeps the loop untouched or tries a heuristic.
#[derive(Debug, Clone, PartialEq)]
pub enum MeterResult {
    Success(Expr),
    /// No guard atom limits the loop; it can iterate forever.
    Unbounded,
    /// Guard or update is not linear; no template applies.
    Nonlinear,
    /// The Farkas system has no solution.
    Unsat,
}

/// Tries to synthesize a metering function for a simple loop.
pub fn find(vars: &VariableManager, oracle: &SmtOracle, rule: &Rule) -> MeterResult {
    // Pre-reduce on a scratch copy: propagate equalities and eliminate
    // guard-only temporaries before looking for a template.
    let mut work = rule.clone();
    preprocess::propagate_equalities(vars, &mut work);
    preprocess::eliminate_temp_vars(vars, &mut work);
    preprocess::remove_trivial_guards(&mut work);

    let updates: Vec<&Update> = work.rhss.iter().map(|rhs| &rhs.update).collect();
    let guard = toolbox::replace_equalities(&work.guard.atoms);

    let mut irrelevant = Vec::new();
    let mut reduced = toolbox::reduce_guard(vars, oracle, &guard, &updates, &mut irrelevant);
    if reduced.is_empty() {
        return MeterResult::Unbounded;
    }

    let relevant = toolbox::find_relevant_variables(&reduced, &updates);
    let mut guard = guard;
    toolbox::restrict_guard_to_variables(&mut guard, &relevant);
    toolbox::restrict_guard_to_variables(&mut reduced, &relevant);
    let updates: Vec<Update> = updates
        .iter()
        .map(|u| toolbox::restrict_update_to_variables(u, &relevant))
        .collect();

    // Temporaries are chosen afresh at every firing, so they cannot carry
    // the metering function, and a violated atom over temporaries does
    // not stop the loop (the next firing picks new witnesses). Only the
    // temp-free limiting atoms bound the iteration count.
    let template: IndexSet<VarId> = relevant
        .iter()
        .copied()
        .filter(|v| !vars.is_temp(*v))
        .collect();
    let limiting: Vec<Rel> = reduced
        .iter()
        .filter(|atom| !atom.has_var_where(|v| vars.is_temp(v)))
        .cloned()
        .collect();
    if limiting.is_empty() {
        return MeterResult::Unsat;
    }

    let mut problem = MeterProblem::new(template);
    let Some(()) = problem.build_rows(&guard, &limiting, &updates) else {
        return MeterResult::Nonlinear;
    };

    // Fail fast without the enabling condition, then demand it.
    match problem.solve(oracle, Enabling::None) {
        None => MeterResult::Unsat,
        Some(_) => match problem.solve(oracle, Enabling::Strict) {
            Some(m) => MeterResult::Success(m),
            None => match problem.solve(oracle, Enabling::Weak) {
                Some(m) => MeterResult::Success(m),
                None => MeterResult::Unsat,
            },
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Enabling {
    None,
    /// `G ==> m >= 1`
    Strict,
    /// `G ==> m >= 0`
    Weak,
}

struct MeterProblem {
    /// Template variables, in column order 0..k.
    template_vars: Vec<VarId>,
    cols: IndexMap<ColKey, usize>,
    guard_rows: Vec<LinearConstraint>,
    not_guard_rows: Vec<LinearConstraint>,
    /// One constraint set per update: guard rows plus primed equalities.
    update_rows: Vec<Vec<LinearConstraint>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ColKey {
    Var(VarId),
    Primed(VarId),
}

impl MeterProblem {
    fn new(relevant: IndexSet<VarId>) -> Self {
        let template_vars: Vec<VarId> = relevant.iter().copied().collect();
        let mut cols = IndexMap::new();
        for &v in &template_vars {
            cols.insert(ColKey::Var(v), cols.len());
        }
        MeterProblem {
            template_vars,
            cols,
            guard_rows: Vec::new(),
            not_guard_rows: Vec::new(),
            update_rows: Vec::new(),
        }
    }

    fn col(&mut self, key: ColKey) -> usize {
        let next = self.cols.len();
        *self.cols.entry(key).or_insert(next)
    }

    /// Row for `expr <= 0`.
    fn row_le_zero(&mut self, expr: &Expr) -> Option<LinearConstraint> {
        let (coeffs, constant) = expr.lin_coeffs()?;
        let mut row = LinearConstraint {
            coeffs: Vec::with_capacity(coeffs.len()),
            bound: -constant,
        };
        for (v, c) in coeffs {
            let col = self.col(ColKey::Var(v));
            row.coeffs.push((col, c));
        }
        Some(row)
    }

    fn row_from_le(&mut self, atom: &Rel) -> Option<LinearConstraint> {
        let le = atom.to_le();
        self.row_le_zero(&(le.lhs - le.rhs))
    }

    fn build_rows(&mut self, guard: &[Rel], reduced: &[Rel], updates: &[Update]) -> Option<()> {
        for atom in guard {
            let row = self.row_from_le(atom)?;
            self.guard_rows.push(row);
        }
        for atom in reduced {
            let negated = atom.to_le().negate_le();
            let row = self.row_le_zero(&(negated.lhs - negated.rhs))?;
            self.not_guard_rows.push(row);
        }
        for update in updates {
            let mut rows = self.guard_rows.clone();
            for (v, e) in update.iter() {
                // primed - e <= 0 and e - primed <= 0
                let (coeffs, constant) = e.lin_coeffs()?;
                let primed = self.col(ColKey::Primed(*v));
                let mut fwd = LinearConstraint {
                    coeffs: vec![(primed, rational(1))],
                    bound: constant.clone(),
                };
                let mut bwd = LinearConstraint {
                    coeffs: vec![(primed, rational(-1))],
                    bound: -constant.clone(),
                };
                for (w, c) in coeffs {
                    let col = self.col(ColKey::Var(w));
                    fwd.coeffs.push((col, -c.clone()));
                    bwd.coeffs.push((col, c));
                }
                rows.push(fwd);
                rows.push(bwd);
            }
            self.update_rows.push(rows);
        }
        Some(())
    }

    fn coeff_name(i: usize) -> String {
        format!("c!{i}")
    }

    /// Assembles the full constraint system and asks the oracle for
    /// template coefficients.
    fn solve(&self, oracle: &SmtOracle, enabling: Enabling) -> Option<Expr> {
        let num_cols = self.cols.len();
        let mut lambdas = FreshLambdas::default();
        let mut terms = Vec::new();

        let template: Vec<(usize, SmtTerm)> = self
            .template_vars
            .iter()
            .enumerate()
            .map(|(i, _)| (i, SmtTerm::var(Self::coeff_name(i))))
            .collect();
        let negated: Vec<(usize, SmtTerm)> = template
            .iter()
            .map(|(c, t)| (*c, SmtTerm::int(-1).mul(t.clone())))
            .collect();
        let abs = SmtTerm::var("c!abs");

        // !g ==> m <= 0, one implication per limiting atom
        for row in &self.not_guard_rows {
            terms.push(farkas::apply(
                std::slice::from_ref(row),
                num_cols,
                &template,
                abs.clone(),
                0,
                &mut lambdas,
            )?);
        }

        // G && x' = U(x) ==> m - m' <= 1, for every update
        for rows in &self.update_rows {
            let mut coeffs = Vec::new();
            for (i, &v) in self.template_vars.iter().enumerate() {
                if let Some(&primed_col) = self.cols.get(&ColKey::Primed(v)) {
                    let c = SmtTerm::var(Self::coeff_name(i));
                    coeffs.push((i, c.clone()));
                    coeffs.push((primed_col, SmtTerm::int(-1).mul(c)));
                }
            }
            terms.push(farkas::apply(
                rows,
                num_cols,
                &coeffs,
                SmtTerm::int(0),
                1,
                &mut lambdas,
            )?);
        }

        // G ==> m >= 1 (or >= 0): -m <= -1 (or 0)
        match enabling {
            Enabling::None => {}
            Enabling::Strict | Enabling::Weak => {
                let delta = if enabling == Enabling::Strict { -1 } else { 0 };
                terms.push(farkas::apply(
                    &self.guard_rows,
                    num_cols,
                    &negated,
                    SmtTerm::int(-1).mul(abs.clone()),
                    delta,
                    &mut lambdas,
                )?);
            }
        }

        // Nontrivial: some variable coefficient is nonzero.
        terms.push(SmtTerm::or(
            (0..self.template_vars.len())
                .map(|i| SmtTerm::var(Self::coeff_name(i)).eq(SmtTerm::int(0)).not())
                .collect(),
        ));

        let mut names: Vec<String> = lambdas.names.clone();
        for i in 0..self.template_vars.len() {
            names.push(Self::coeff_name(i));
        }
        names.push("c!abs".to_string());

        let (result, model) = oracle.check_terms_with_model(&terms, &names);
        if !result.is_sat() {
            debug!(?enabling, "metering query not satisfiable");
            return None;
        }
        let model = model?;
        let mut m = vec![Expr::int(model.get_int("c!abs")?)];
        for (i, &v) in self.template_vars.iter().enumerate() {
            let c = model.get_int(&Self::coeff_name(i))?;
            if c != 0 {
                m.push(Expr::int(c) * Expr::var(v));
            }
        }
        Some(Expr::add(m))
    }
}
