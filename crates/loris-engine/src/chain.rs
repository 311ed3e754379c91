//! Rule composition and the chaining strategies: linear paths, tree
//! paths, last-resort location elimination, and folding freshly
//! accelerated loops into their incoming rules.

use std::collections::BTreeSet;

use loris_ir::expr::{Expr, Subs};
use loris_ir::rule::{Rule, RuleRhs};
use loris_ir::{ItsProblem, LocationId, RuleId};
use loris_smt::SmtOracle;
use tracing::debug;

/// Renames every temporary variable of `rule` to a fresh one, avoiding
/// capture when two rules carrying temporaries are composed.
pub fn rename_temp_vars(its: &mut ItsProblem, rule: &Rule) -> Rule {
    let mut subs = Subs::new();
    for v in rule.vars() {
        if its.vars.is_temp(v) {
            let basename = its.vars.name(v).to_string();
            let fresh = its.vars.fresh(&basename, true);
            subs.insert(v, Expr::var(fresh));
        }
    }
    if subs.is_empty() {
        rule.clone()
    } else {
        rule.subs(&subs)
    }
}

/// The unique right-hand-side slot of `rule` targeting `loc`, if any.
/// Rules visiting `loc` on several slots are not composed.
pub fn rhs_index_to(rule: &Rule, loc: LocationId) -> Option<usize> {
    let mut found = None;
    for (i, rhs) in rule.rhss.iter().enumerate() {
        if rhs.target == loc {
            if found.is_some() {
                return None;
            }
            found = Some(i);
        }
    }
    found
}

/// Composes `first` (on its `rhs_index`-th slot) with `second`, which
/// must start where that slot ends. Returns `None` when the combined
/// guard is provably unsatisfiable; `unknown` still chains.
pub fn chain_rules(
    its: &mut ItsProblem,
    oracle: &SmtOracle,
    first: &Rule,
    rhs_index: usize,
    second: &Rule,
) -> Option<Rule> {
    debug_assert_eq!(first.rhss[rhs_index].target, second.source);
    let second = rename_temp_vars(its, second);
    let u1 = first.rhss[rhs_index].update.as_subs();

    let mut guard = first.guard.clone();
    for atom in &second.guard {
        guard.push(atom.subs(&u1));
    }
    let cost = first.cost.clone() + second.cost.subs(&u1);

    let mut rhss: Vec<RuleRhs> = Vec::with_capacity(first.rhss.len() - 1 + second.rhss.len());
    for (i, rhs) in first.rhss.iter().enumerate() {
        if i == rhs_index {
            for srhs in &second.rhss {
                rhss.push(RuleRhs {
                    target: srhs.target,
                    update: srhs.update.compose_after(&first.rhss[rhs_index].update),
                });
            }
        } else {
            rhss.push(rhs.clone());
        }
    }

    let chained = Rule {
        source: first.source,
        guard,
        cost,
        rhss,
    };
    if !oracle.consistent(&chained.guard.atoms, &its.vars) {
        debug!("chained guard is unsat, dropping composition");
        return None;
    }
    Some(chained)
}

/// Contracts every interior location with exactly one incoming and one
/// outgoing rule and no self-loop.
pub fn chain_linear_paths(its: &mut ItsProblem, oracle: &SmtOracle) -> bool {
    let mut changed = false;
    let mut again = true;
    while again {
        again = false;
        for loc in its.locations() {
            if its.is_initial(loc) || !its.simple_loops_at(loc).is_empty() {
                continue;
            }
            let incoming = its.rules_to(loc);
            let outgoing = its.rules_from(loc);
            if incoming.len() != 1 || outgoing.len() != 1 {
                continue;
            }
            let in_id = incoming[0];
            let out_id = outgoing[0];
            let Some(slot) = rhs_index_to(its.rule(in_id), loc) else {
                continue;
            };
            let first = its.rule(in_id).clone();
            let second = its.rule(out_id).clone();
            let chained = chain_rules(its, oracle, &first, slot, &second);
            its.remove_rule(in_id);
            its.remove_rule(out_id);
            if let Some(rule) = chained {
                its.add_rule(rule);
            }
            changed = true;
            again = true;
        }
    }
    changed
}

/// Contracts every interior location without a self-loop, replacing each
/// (incoming, outgoing) pair by its composition. May grow the rule count
/// to |incoming| * |outgoing|.
pub fn chain_tree_paths(its: &mut ItsProblem, oracle: &SmtOracle) -> bool {
    let mut changed = false;
    for loc in its.locations() {
        changed |= contract_location(its, oracle, loc, false);
    }
    changed
}

/// Last resort: contracts the single interior location that minimizes the
/// post-contraction rule count. Locations still carrying self-loops are
/// skipped; the loops must have been accelerated (and folded away) first.
pub fn eliminate_a_location(its: &mut ItsProblem, oracle: &SmtOracle) -> Option<String> {
    let mut best: Option<(usize, LocationId)> = None;
    for loc in its.locations() {
        if !eligible_for_contraction(its, loc) {
            continue;
        }
        let score = its.rules_to(loc).len() * its.rules_from(loc).len();
        if best.map_or(true, |(s, _)| score < s) {
            best = Some((score, loc));
        }
    }
    let (_, loc) = best?;
    let name = its.location_name(loc).to_string();
    contract_location(its, oracle, loc, true);
    Some(name)
}

fn eligible_for_contraction(its: &ItsProblem, loc: LocationId) -> bool {
    !its.is_initial(loc)
        && its.simple_loops_at(loc).is_empty()
        && its.has_rules_to(loc)
        && its.has_rules_from(loc)
}

/// Replaces every (incoming, outgoing) pair at `loc` by its composition
/// and deletes the consumed rules. Infeasible compositions are dropped,
/// which is sound for lower bounds.
fn contract_location(
    its: &mut ItsProblem,
    oracle: &SmtOracle,
    loc: LocationId,
    forced: bool,
) -> bool {
    if !forced && !eligible_for_contraction(its, loc) {
        return false;
    }
    let incoming = its.rules_to(loc);
    let outgoing = its.rules_from(loc);
    if incoming.is_empty() || outgoing.is_empty() {
        return false;
    }
    let mut changed = false;
    for &in_id in &incoming {
        let Some(slot) = rhs_index_to(its.rule(in_id), loc) else {
            continue;
        };
        let first = its.rule(in_id).clone();
        for &out_id in &outgoing {
            let second = its.rule(out_id).clone();
            if let Some(rule) = chain_rules(its, oracle, &first, slot, &second) {
                its.add_rule(rule);
            }
            changed = true;
        }
        its.remove_rule(in_id);
    }
    for out_id in outgoing {
        its.remove_rule(out_id);
        changed = true;
    }
    changed
}

/// Folds each freshly accelerated loop into the rules entering its
/// location, then removes the accelerated loop. Incoming rules are kept;
/// incoming self-loops are skipped (compositions among summaries never
/// meter again and would linger as dead self-loops).
pub fn chain_accelerated_rules(
    its: &mut ItsProblem,
    oracle: &SmtOracle,
    accelerated: &BTreeSet<RuleId>,
) -> bool {
    let mut changed = false;
    for &accel_id in accelerated {
        if !its.has_rule(accel_id) {
            continue;
        }
        let loc = its.rule(accel_id).source;
        for in_id in its.rules_to(loc) {
            if in_id == accel_id || its.rule(in_id).source == loc {
                continue;
            }
            let Some(slot) = rhs_index_to(its.rule(in_id), loc) else {
                continue;
            };
            let first = its.rule(in_id).clone();
            let second = its.rule(accel_id).clone();
            if let Some(rule) = chain_rules(its, oracle, &first, slot, &second) {
                its.add_rule(rule);
                changed = true;
            }
        }
        its.remove_rule(accel_id);
        changed = true;
    }
    changed
}
