//! The simplification driver: an iterative fixpoint that accelerates
//! self-loops, chains rules, prunes the graph, and finally certifies a
//! lower bound from the rules remaining at the initial location.

use std::collections::BTreeSet;

use tracing::info;

use loris_ir::{Complexity, Expr, ItsProblem, LocationId, RuleId};
use loris_smt::SmtOracle;

use crate::accelerate;
use crate::asymptotic;
use crate::chain;
use crate::config::AnalysisSettings;
use crate::export::{self, DotOutput};
use crate::preprocess;
use crate::proof::ProofLog;
use crate::prune;
use crate::recurrence::ClosedFormSolver;
use crate::result::RuntimeResult;
use crate::timing::Deadlines;

/// Everything a run produces: the bound plus the optional artifacts.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub runtime: RuntimeResult,
    pub proof: String,
    pub dot: Option<String>,
    pub simplified_koat: Option<String>,
}

pub struct Analysis<'a> {
    its: &'a mut ItsProblem,
    cfg: AnalysisSettings,
    oracle: SmtOracle,
    solver: ClosedFormSolver,
    deadlines: Deadlines,
    proof: ProofLog,
    dot: Option<DotOutput>,
}

impl<'a> Analysis<'a> {
    /// Analyzes the problem in place and returns the derived lower bound.
    pub fn analyze(its: &'a mut ItsProblem, cfg: AnalysisSettings) -> AnalysisOutcome {
        let deadlines = Deadlines::from_timeout_secs(cfg.timeout_secs);
        let oracle = SmtOracle::new(deadlines.smt_budget_ms());
        let dot = cfg.dot_output.then(DotOutput::new);
        Analysis {
            its,
            oracle,
            solver: ClosedFormSolver,
            deadlines,
            proof: ProofLog::new(true),
            dot,
            cfg,
        }
        .run()
    }

    fn run(mut self) -> AnalysisOutcome {
        self.proof.section("Pre-processing the ITS problem");
        self.proof.headline("Initial ITS problem");
        self.print_step("Initial");

        if self.ensure_proper_initial_location() {
            self.proof
                .headline("Added a fresh start location (such that it has no incoming rules):");
            self.print_step("Fresh start");
        }

        self.refresh_budget();
        if prune::remove_unsat_initial_rules(self.its, &self.oracle) {
            self.proof.headline("Removed unsatisfiable initial rules:");
            self.print_step("Reduced initial");
        }

        let mut runtime = RuntimeResult::unknown();

        // No lower bound is provable for an empty ITS.
        if self.its.is_empty() {
            return self.finish(runtime, None);
        }

        let mut accelerated_once = false;
        let mut nonlinear = !self.its.is_linear();

        if self.cfg.do_preprocessing && self.preprocess_rules() {
            self.proof.headline("Simplified all rules, resulting in:");
            self.print_step("Simplify");
        }

        self.proof.section("Simplification by acceleration and chaining");

        'simplify: while !self.is_fully_simplified() {
            // Repeat linear chaining and simple loop acceleration.
            let mut outer_progress = false;
            loop {
                let mut changed = false;
                self.refresh_budget();

                if nonlinear && prune::remove_sink_rhss(self.its) {
                    changed = true;
                    self.proof
                        .headline("Removed locations with no outgoing rules from right-hand sides:");
                    self.print_step("Removed sinks");
                }
                if self.deadlines.soft_exceeded() {
                    break 'simplify;
                }

                let mut accelerated: BTreeSet<RuleId> = BTreeSet::new();
                if self.accelerate_simple_loops(&mut accelerated) {
                    changed = true;
                    accelerated_once = true;
                    self.proof.headline(
                        "Accelerated all simple loops using metering functions (where possible):",
                    );
                    self.print_step("Accelerate simple loops");
                }
                if self.deadlines.soft_exceeded() {
                    break 'simplify;
                }

                if chain::chain_accelerated_rules(self.its, &self.oracle, &accelerated) {
                    changed = true;
                    self.proof.headline("Chained accelerated rules (with incoming rules):");
                    self.print_step("Chain accelerated rules");
                }
                if self.deadlines.soft_exceeded() {
                    break 'simplify;
                }

                if prune::remove_leaves_and_unreachable(self.its) {
                    changed = true;
                    self.proof
                        .headline("Removed unreachable locations (and leaf rules with constant cost):");
                    self.print_step("Remove unreachable");
                }
                if self.deadlines.soft_exceeded() {
                    break 'simplify;
                }

                if chain::chain_linear_paths(self.its, &self.oracle) {
                    changed = true;
                    self.proof.headline("Eliminated locations (on linear paths):");
                    self.print_step("Chain linear paths");
                }
                if self.deadlines.soft_exceeded() {
                    break 'simplify;
                }

                if changed && nonlinear {
                    nonlinear = !self.its.is_linear();
                    if !nonlinear {
                        self.proof
                            .section("Obtained a tail recursive problem, continuing simplification");
                    }
                }

                if !changed {
                    break;
                }
                outer_progress = true;
            }

            if self.is_fully_simplified() {
                break;
            }

            // More involved strategies once the cheap loop stabilizes.
            if chain::chain_tree_paths(self.its, &self.oracle) {
                outer_progress = true;
                self.proof.headline("Eliminated locations (on tree-shaped paths):");
                self.print_step("Chain tree paths");
            } else if let Some(name) = chain::eliminate_a_location(self.its, &self.oracle) {
                outer_progress = true;
                self.proof
                    .headline(&format!("Eliminated location {name} (as a last resort):"));
                self.print_step("Eliminate location");
            }

            if !outer_progress {
                // Nothing moved in a whole round; self-loops we failed to
                // accelerate would keep us here forever.
                self.proof
                    .warning("No further simplification possible, analysis is stuck");
                break;
            }

            if accelerated_once && self.prune_rules() {
                self.proof.headline("Applied pruning (of leafs and parallel rules):");
                self.print_step("Prune");
            }
            if self.deadlines.soft_exceeded() {
                break;
            }
        }

        if self.deadlines.soft_exceeded() {
            self.proof.warning("Aborted due to lack of remaining time");
        }

        if self.is_fully_simplified() {
            // Duplicates modulo updates would only waste asymptotic checks.
            let initial_rules = self.its.rules_from(self.its.initial_location());
            prune::remove_duplicate_rules(self.its, &initial_rules, false);
        }

        let simplified_koat = self
            .cfg
            .print_simplified_koat
            .then(|| export::print_koat(self.its));

        self.proof.section("Computing asymptotic complexity");
        self.proof.headline("Fully simplified ITS problem");
        self.print_step("Final");

        if !self.is_fully_simplified() {
            self.proof
                .warning("This is only a partial result (probably due to a timeout)");
            self.remove_constant_paths_after_timeout();
            self.proof.headline("Removed rules with constant complexity:");
            self.print_step("Removed constant");
            runtime = self.max_partial_result();
        } else {
            runtime = self.max_runtime();
        }

        // The graph was non-empty, so at least one step of work happens.
        if runtime.cpx == Complexity::Unknown {
            runtime = RuntimeResult {
                cpx: Complexity::Const,
                bound: Expr::one(),
                reduced_cpx: Complexity::Const,
                guard: loris_ir::Guard::trivial(),
            };
        }

        info!(complexity = %runtime.cpx, "analysis finished");
        self.finish(runtime, simplified_koat)
    }

    fn finish(mut self, runtime: RuntimeResult, simplified_koat: Option<String>) -> AnalysisOutcome {
        let dot = self.dot.take().map(|mut dot| {
            dot.result(&runtime.cpx.to_string());
            dot.finish()
        });
        AnalysisOutcome {
            runtime,
            proof: self.proof.as_str().to_string(),
            dot,
            simplified_koat,
        }
    }

    fn refresh_budget(&mut self) {
        self.oracle.set_timeout_ms(self.deadlines.smt_budget_ms());
    }

    /// The initial location must have no incoming rules; a fresh start
    /// location with a zero-cost rule is inserted otherwise.
    fn ensure_proper_initial_location(&mut self) -> bool {
        let initial = self.its.initial_location();
        if !self.its.has_rules_to(initial) {
            return false;
        }
        let name = format!("__init{}", self.its.location_count());
        let fresh = self.its.add_location(name);
        self.its
            .add_rule(loris_ir::Rule::dummy(fresh, initial));
        self.its.set_initial(fresh);
        true
    }

    fn preprocess_rules(&mut self) -> bool {
        let pass_start = std::time::Instant::now();
        let mut changed = prune::remove_leaves_and_unreachable(self.its);

        for loc in self.its.locations() {
            for id in self.its.rules_from(loc) {
                if self.deadlines.preprocessing_exceeded(pass_start) {
                    return changed;
                }
                let mut rule = self.its.rule(id).clone();
                let mut rule_changed = false;
                if self.cfg.eliminate_cost_constraints {
                    rule_changed |=
                        preprocess::try_to_remove_cost(&self.its.vars, &self.oracle, &mut rule);
                }
                rule_changed |= preprocess::simplify_rule(&self.its.vars, &self.oracle, &mut rule);
                if rule_changed {
                    *self.its.rule_mut(id) = rule;
                    changed = true;
                }
            }
        }

        for loc in self.its.locations() {
            for succ in self.its.successors(loc) {
                if self.deadlines.preprocessing_exceeded(pass_start) {
                    return changed;
                }
                let ids = self.its.rules_from_to(loc, succ);
                changed |= prune::remove_duplicate_rules(self.its, &ids, true);
            }
        }
        changed
    }

    fn is_fully_simplified(&self) -> bool {
        self.its
            .locations()
            .filter(|loc| !self.its.is_initial(*loc))
            .all(|loc| !self.its.has_rules_from(loc))
    }

    fn accelerate_simple_loops(&mut self, accelerated: &mut BTreeSet<RuleId>) -> bool {
        let mut changed = false;
        for loc in self.its.locations().collect::<Vec<LocationId>>() {
            changed |= accelerate::accelerate_simple_loops(
                self.its,
                &self.oracle,
                &self.solver,
                &self.deadlines,
                loc,
                accelerated,
            );
            if self.deadlines.soft_exceeded() {
                return changed;
            }
        }
        changed
    }

    fn prune_rules(&mut self) -> bool {
        let mut changed = prune::remove_leaves_and_unreachable(self.its);
        changed |= prune::prune_parallel_rules(self.its);
        changed
    }

    /// Iterates over the initial location's rules and keeps the largest
    /// complexity the asymptotic check can witness.
    fn max_runtime(&mut self) -> RuntimeResult {
        let initial = self.its.initial_location();
        let mut res = RuntimeResult::unknown();
        for id in self.its.rules_from(initial) {
            let rule = self.its.rule(id).clone();
            // The syntactic complexity is a sound upper bound, so rules
            // that cannot improve the result are skipped. Costs with
            // temporary variables can hide unbounded growth.
            let upper = rule.cost.complexity();
            let has_temp_var = !rule.cost.is_infty()
                && rule.cost.has_var_where(|v| self.its.vars.is_temp(v));
            if upper <= res.cpx && !has_temp_var {
                self.proof
                    .line(&format!("Skipping rule {id}: cannot improve the result"));
                continue;
            }
            self.refresh_budget();
            self.proof
                .headline(&format!("Computing asymptotic complexity for rule {id}"));
            let check =
                asymptotic::determine_complexity(self.its, &self.oracle, &rule.guard, &rule.cost);
            self.proof.line(&format!(
                "Resulting cost {} has complexity {} ({})",
                check.cost.display(&self.its.vars),
                check.cpx,
                check.reason
            ));
            if check.cpx > res.cpx {
                res = RuntimeResult {
                    cpx: check.cpx,
                    bound: check.cost,
                    reduced_cpx: check.reduced_cpx,
                    guard: rule.guard.clone(),
                };
                if res.cpx >= Complexity::Infty {
                    break;
                }
            }
            if self.deadlines.hard_exceeded() {
                break;
            }
        }
        res
    }

    /// After a timeout: drop subtrees that only carry constant cost, then
    /// alternate the asymptotic check with one level of chaining from the
    /// initial location.
    fn remove_constant_paths_after_timeout(&mut self) {
        let mut visited = BTreeSet::new();
        let initial = self.its.initial_location();
        remove_constant_paths_impl(self.its, &self.deadlines, initial, &mut visited);
    }

    fn max_partial_result(&mut self) -> RuntimeResult {
        let initial = self.its.initial_location();
        let mut res = RuntimeResult::unknown();
        // Contraction unrolls loops one level per round; without a hard
        // deadline it must stop once the result stops improving.
        let mut stale_rounds = 0;
        loop {
            if self.deadlines.hard_exceeded() {
                self.proof.warning("Aborting due to timeout");
                return res;
            }
            let before = res.cpx;

            for id in self.its.rules_from(initial) {
                let rule = self.its.rule(id).clone();
                let upper = rule.cost.complexity();
                let has_temp_var = !rule.cost.is_infty()
                    && rule.cost.has_var_where(|v| self.its.vars.is_temp(v));
                if upper <= res.cpx.max(Complexity::Const) && !has_temp_var {
                    continue;
                }
                self.refresh_budget();
                let check = asymptotic::determine_complexity(
                    self.its,
                    &self.oracle,
                    &rule.guard,
                    &rule.cost,
                );
                if check.cpx > res.cpx {
                    self.proof
                        .line(&format!("Found new complexity {}", check.cpx));
                    res = RuntimeResult {
                        cpx: check.cpx,
                        bound: check.cost,
                        reduced_cpx: check.reduced_cpx,
                        guard: rule.guard.clone(),
                    };
                    if res.cpx >= Complexity::Infty {
                        return res;
                    }
                }
                if self.deadlines.hard_exceeded() {
                    self.proof.warning("Aborting due to timeout");
                    return res;
                }
            }

            if res.cpx > before {
                stale_rounds = 0;
            } else {
                stale_rounds += 1;
                if stale_rounds >= 3 {
                    return res;
                }
            }

            // Contract one level below the initial location.
            let succs = self.its.successors(initial);
            if succs.is_empty() {
                return res;
            }
            for succ in succs {
                for first_id in self.its.rules_from_to(initial, succ) {
                    let first = self.its.rule(first_id).clone();
                    let Some(slot) = chain::rhs_index_to(&first, succ) else {
                        self.its.remove_rule(first_id);
                        continue;
                    };
                    for second_id in self.its.rules_from(succ) {
                        let second = self.its.rule(second_id).clone();
                        if let Some(chained) =
                            chain::chain_rules(self.its, &self.oracle, &first, slot, &second)
                        {
                            self.its.add_rule(chained);
                        }
                        if self.deadlines.hard_exceeded() {
                            self.proof.warning("Aborting due to timeout");
                            return res;
                        }
                    }
                    self.its.remove_rule(first_id);
                }
            }
            self.proof.headline("Performed chaining from the start location:");
            self.print_step("Chaining from start");
        }
    }

    fn print_step(&mut self, description: &str) {
        self.proof.problem(self.its);
        if let Some(dot) = &mut self.dot {
            dot.subgraph(self.its, description);
        }
    }
}

/// Returns true when no rule with more than constant cost is reachable
/// from `curr`; constant rules into such subtrees are removed on the way
/// back up.
fn remove_constant_paths_impl(
    its: &mut ItsProblem,
    deadlines: &Deadlines,
    curr: LocationId,
    visited: &mut BTreeSet<LocationId>,
) -> bool {
    if !visited.insert(curr) {
        return true;
    }
    for next in its.successors(curr) {
        if deadlines.hard_exceeded() {
            return false;
        }
        if remove_constant_paths_impl(its, deadlines, next, visited) {
            for id in its.rules_from_to(curr, next) {
                if its.rule(id).cost.complexity() <= Complexity::Const {
                    its.remove_rule(id);
                }
            }
        }
    }
    its.rules_from(curr).is_empty()
}
