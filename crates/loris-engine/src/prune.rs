//! Rule removal passes: unreachable and leaf-constant rules, provably
//! unsatisfiable initial rules, duplicates, and excess parallel rules.

use std::collections::{BTreeMap, BTreeSet};

use loris_ir::{Complexity, ItsProblem, LocationId, RuleId};
use loris_smt::SmtOracle;

/// Keep at most this many parallel rules between one location pair.
pub const MAX_PARALLEL_RULES: usize = 5;

/// Removes rules that are unreachable from the initial location, and
/// excess rules leading only into leaf locations while contributing at
/// most constant cost. Rules out of the initial location are exempt from
/// the leaf criterion (they carry the final result), and the last
/// outgoing rule of a location is kept so the constant cost of a path
/// still folds into the bound when the path is chained.
pub fn remove_leaves_and_unreachable(its: &mut ItsProblem) -> bool {
    let mut changed = false;
    loop {
        let mut round = false;

        let mut reachable: BTreeSet<LocationId> = BTreeSet::new();
        let mut stack = vec![its.initial_location()];
        while let Some(loc) = stack.pop() {
            if !reachable.insert(loc) {
                continue;
            }
            for succ in its.successors(loc) {
                stack.push(succ);
            }
        }
        for id in its.rule_ids() {
            if !reachable.contains(&its.rule(id).source) {
                its.remove_rule(id);
                round = true;
            }
        }

        for id in its.rule_ids() {
            let rule = its.rule(id);
            if its.is_initial(rule.source) {
                continue;
            }
            if rule.cost.complexity() > Complexity::Const {
                continue;
            }
            if its.rules_from(rule.source).len() <= 1 {
                continue;
            }
            let all_leaves = rule
                .targets()
                .all(|t| t != rule.source && !its.has_rules_from(t));
            if all_leaves {
                its.remove_rule(id);
                round = true;
            }
        }

        if !round {
            return changed;
        }
        changed = true;
    }
}

/// Removes rules out of the initial location whose guard is provably
/// unsatisfiable. `unknown` keeps the rule.
pub fn remove_unsat_initial_rules(its: &mut ItsProblem, oracle: &SmtOracle) -> bool {
    let mut changed = false;
    for id in its.rules_from(its.initial_location()) {
        let guard = &its.rule(id).guard;
        if oracle.check_rels(&guard.atoms, &its.vars).is_unsat() {
            its.remove_rule(id);
            changed = true;
        }
    }
    changed
}

/// Among the given rules, keeps one representative per equivalence class
/// of (targets, guard, cost[, updates]). The oldest rule survives.
pub fn remove_duplicate_rules(its: &mut ItsProblem, ids: &[RuleId], compare_updates: bool) -> bool {
    let mut seen: BTreeMap<String, RuleId> = BTreeMap::new();
    let mut changed = false;
    for &id in ids {
        if !its.has_rule(id) {
            continue;
        }
        let key = rule_key(its, id, compare_updates);
        if seen.contains_key(&key) {
            its.remove_rule(id);
            changed = true;
        } else {
            seen.insert(key, id);
        }
    }
    changed
}

/// Canonical fingerprint of a rule for duplicate detection. Guards are
/// compared as sets of normalized atoms, expressions modulo expansion.
fn rule_key(its: &ItsProblem, id: RuleId, compare_updates: bool) -> String {
    let rule = its.rule(id);
    let mut atoms: Vec<String> = rule
        .guard
        .iter()
        .map(|a| format!("{:?}", a.normalize()))
        .collect();
    atoms.sort();
    let mut key = format!(
        "src={} guard={:?} cost={:?}",
        rule.source,
        atoms,
        rule.cost.expand()
    );
    for rhs in &rule.rhss {
        key.push_str(&format!(" tgt={}", rhs.target));
        if compare_updates {
            let mut entries: Vec<String> = rhs
                .update
                .iter()
                .map(|(v, e)| format!("{v}:{:?}", e.expand()))
                .collect();
            entries.sort();
            key.push_str(&format!(" upd={entries:?}"));
        }
    }
    key
}

/// Bounds the number of parallel rules per (source, targets) pair,
/// keeping the ones with the highest syntactic cost complexity. Older
/// rules win ties.
pub fn prune_parallel_rules(its: &mut ItsProblem) -> bool {
    let mut groups: BTreeMap<(LocationId, Vec<LocationId>), Vec<RuleId>> = BTreeMap::new();
    for (id, rule) in its.rules() {
        let targets: Vec<LocationId> = rule.targets().collect();
        groups.entry((rule.source, targets)).or_default().push(id);
    }
    let mut changed = false;
    for (_, mut ids) in groups {
        if ids.len() <= MAX_PARALLEL_RULES {
            continue;
        }
        ids.sort_by_key(|id| (std::cmp::Reverse(its.rule(*id).cost.complexity()), *id));
        for id in ids.drain(MAX_PARALLEL_RULES..) {
            its.remove_rule(id);
            changed = true;
        }
    }
    changed
}

/// Non-linear variant: drops right-hand-side components whose target has
/// no outgoing rules. At least one component is kept so the rule stays a
/// rule.
pub fn remove_sink_rhss(its: &mut ItsProblem) -> bool {
    let mut changed = false;
    for id in its.rule_ids() {
        let rule = its.rule(id).clone();
        if rule.rhss.len() <= 1 {
            continue;
        }
        let keep: Vec<bool> = rule
            .rhss
            .iter()
            .map(|rhs| its.has_rules_from(rhs.target))
            .collect();
        if keep.iter().all(|k| *k) {
            continue;
        }
        let mut new_rule = rule.clone();
        let mut iter = keep.iter();
        new_rule.rhss.retain(|_| *iter.next().unwrap());
        if new_rule.rhss.is_empty() {
            new_rule.rhss.push(rule.rhss[0].clone());
        }
        if new_rule.rhss.len() != rule.rhss.len() {
            its.remove_rule(id);
            its.add_rule(new_rule);
            changed = true;
        }
    }
    changed
}
