//! Self-loop acceleration: metering function synthesis plus recurrence
//! closed forms turn a loop into one rule summarizing `m` iterations.
//! Parallel loops at one location are additionally *nested*: an original
//! loop chained with an accelerated one often admits a new metering
//! function whose summary captures multiplicative behavior.

use std::collections::BTreeSet;

use tracing::debug;

use loris_ir::expr::Expr;
use loris_ir::rel::Rel;
use loris_ir::rule::Rule;
use loris_ir::{ItsProblem, LocationId, RuleId};
use loris_smt::SmtOracle;

use crate::chain;
use crate::meter::{self, toolbox, MeterResult};
use crate::preprocess;
use crate::recurrence::{self, RecurrenceSolver};
use crate::timing::Deadlines;

/// How often freshly nested loops are handed back to the nesting step.
const NESTING_MAX_ITERATIONS: usize = 3;

/// Accelerates every linear simple loop at `loc` that admits a metering
/// function, nests parallel loops, and finally removes the loops that
/// were summarized. Loops the synthesis fails on are kept untouched.
/// Ids of the new rules are recorded in `accelerated`.
pub fn accelerate_simple_loops(
    its: &mut ItsProblem,
    oracle: &SmtOracle,
    solver: &dyn RecurrenceSolver,
    deadlines: &Deadlines,
    loc: LocationId,
    accelerated: &mut BTreeSet<RuleId>,
) -> bool {
    let originals: Vec<RuleId> = its
        .simple_loops_at(loc)
        .into_iter()
        .filter(|id| !accelerated.contains(id) && its.rule(*id).is_linear())
        .collect();
    if originals.is_empty() {
        return false;
    }

    let mut produced: Vec<RuleId> = Vec::new();
    let mut summarized: Vec<RuleId> = Vec::new();
    for &id in &originals {
        if deadlines.soft_exceeded() {
            break;
        }
        let rule = its.rule(id).clone();
        if let Some(summary) = accelerate_rule(its, oracle, solver, deadlines, &rule) {
            let new_id = add_summary(its, summary, accelerated);
            produced.push(new_id);
            summarized.push(id);
        } else {
            debug!(rule = id, "could not accelerate self-loop");
        }
    }

    // Nesting: chain an original loop around an accelerated one (in both
    // orders) and accelerate the composition. Kept only when it beats
    // both components' cost complexity, so the rule count stays sane.
    let mut last_round = produced.clone();
    for _ in 0..NESTING_MAX_ITERATIONS {
        if last_round.is_empty() || deadlines.soft_exceeded() {
            break;
        }
        let mut next_round = Vec::new();
        for &z in &last_round {
            for &o in &originals {
                if !its.has_rule(o) || !its.has_rule(z) {
                    continue;
                }
                for (first_id, second_id) in [(o, z), (z, o)] {
                    if deadlines.soft_exceeded() {
                        break;
                    }
                    let first = its.rule(first_id).clone();
                    let second = its.rule(second_id).clone();
                    let Some(chained) = chain::chain_rules(its, oracle, &first, 0, &second)
                    else {
                        continue;
                    };
                    let threshold = first
                        .cost
                        .complexity()
                        .max(second.cost.complexity());
                    let Some(summary) =
                        try_summarize(its, oracle, solver, &chained)
                    else {
                        continue;
                    };
                    if summary.cost.complexity() > threshold {
                        let new_id = add_summary(its, summary, accelerated);
                        next_round.push(new_id);
                    }
                }
            }
        }
        last_round = next_round;
    }

    for id in summarized {
        its.remove_rule(id);
    }
    !produced.is_empty()
}

fn add_summary(
    its: &mut ItsProblem,
    mut summary: Rule,
    accelerated: &mut BTreeSet<RuleId>,
) -> RuleId {
    preprocess::remove_trivial_guards(&mut summary);
    preprocess::remove_trivial_updates(&mut summary);
    let id = its.add_rule(summary);
    accelerated.insert(id);
    id
}

/// One acceleration attempt, including the unsat heuristics (guard
/// strengthening and temp-var instantiation).
fn accelerate_rule(
    its: &mut ItsProblem,
    oracle: &SmtOracle,
    solver: &dyn RecurrenceSolver,
    deadlines: &Deadlines,
    rule: &Rule,
) -> Option<Rule> {
    match meter::find(&its.vars, oracle, rule) {
        MeterResult::Success(m) => summarize(its, solver, rule, &m),
        MeterResult::Unbounded => {
            // Nothing limits the loop: its cost is unbounded whenever the
            // guard holds at all.
            let mut summary = rule.clone();
            summary.cost = Expr::Infty;
            Some(summary)
        }
        MeterResult::Nonlinear => None,
        MeterResult::Unsat => {
            // Heuristic 1: propagate constant updates into the guard.
            let mut strengthened = rule.clone();
            let updates: Vec<_> = strengthened
                .rhss
                .iter()
                .map(|rhs| rhs.update.clone())
                .collect();
            let update_refs: Vec<_> = updates.iter().collect();
            if toolbox::strengthen_guard(&mut strengthened.guard.atoms, &update_refs) {
                if let MeterResult::Success(m) = meter::find(&its.vars, oracle, &strengthened) {
                    return summarize(its, solver, &strengthened, &m);
                }
            }
            // Heuristic 2: instantiate temporaries by their bounds.
            for subs in toolbox::find_instantiations_for_temp_vars(&its.vars, &rule.guard.atoms) {
                if deadlines.soft_exceeded() {
                    break;
                }
                let instantiated = rule.subs(&subs);
                if let MeterResult::Success(m) = meter::find(&its.vars, oracle, &instantiated) {
                    return summarize(its, solver, &instantiated, &m);
                }
            }
            None
        }
    }
}

/// Plain metering + summary, without heuristics; used for nested chains.
fn try_summarize(
    its: &mut ItsProblem,
    oracle: &SmtOracle,
    solver: &dyn RecurrenceSolver,
    rule: &Rule,
) -> Option<Rule> {
    match meter::find(&its.vars, oracle, rule) {
        MeterResult::Success(m) => summarize(its, solver, rule, &m),
        _ => None,
    }
}

/// Builds the summary rule for a loop with metering function `m`: guard
/// `G && m >= 1`, iterated update and cost.
fn summarize(
    its: &mut ItsProblem,
    solver: &dyn RecurrenceSolver,
    rule: &Rule,
    m: &Expr,
) -> Option<Rule> {
    let n = its.vars.fresh("n", true);
    let mut summary = rule.clone();
    if !recurrence::calc_iterated(solver, &mut summary, m, n) {
        debug!("recurrence solving failed");
        return None;
    }
    summary.guard.push(Rel::ge(m.clone(), Expr::one()));
    Some(summary)
}
