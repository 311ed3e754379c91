use indexmap::IndexSet;

use loris_ir::rel::Rel;
use loris_ir::variables::VariableManager;

use crate::backends::z3_backend::Z3Solver;
use crate::encode::{Encoder, PowPolicy};
use crate::solver::{Model, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Convenience layer the engine talks to. Builds one fresh solver per
/// query so queries never leak assertions into each other, and applies the
/// remaining analysis budget as the per-query timeout.
///
/// Query semantics follow the soundness split: feasibility queries treat
/// `unknown` as satisfiable (transformations are best-effort), implication
/// queries require a proven `unsat` of the negation.
#[derive(Debug, Clone)]
pub struct SmtOracle {
    timeout_ms: u64,
}

impl SmtOracle {
    pub fn new(timeout_ms: u64) -> Self {
        SmtOracle { timeout_ms }
    }

    /// Updates the per-query budget hint.
    pub fn set_timeout_ms(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    fn solver(&self) -> Z3Solver {
        Z3Solver::with_timeout_ms(self.timeout_ms)
    }

    /// Satisfiability of a conjunction of guard atoms. Unencodable atoms
    /// (symbolic powers) are over-approximated by fresh variables.
    pub fn check_rels(&self, rels: &[Rel], vars: &VariableManager) -> SatResult {
        let mut enc = Encoder::new(vars, PowPolicy::Approximate);
        let mut terms = Vec::with_capacity(rels.len());
        for rel in rels {
            match enc.encode_rel(rel) {
                Some(t) => terms.push(t),
                None => return SatResult::Unknown("atom not encodable".into()),
            }
        }
        let names = declared_names(rels, vars, &enc.aux_vars);
        self.run(&terms, &names)
    }

    /// Feasibility: everything that is not proven unsatisfiable counts as
    /// satisfiable.
    pub fn consistent(&self, rels: &[Rel], vars: &VariableManager) -> bool {
        !self.check_rels(rels, vars).is_unsat()
    }

    /// Proven satisfiability (used by the final asymptotic check, where
    /// `unknown` must not be trusted).
    pub fn proven_sat(&self, rels: &[Rel], vars: &VariableManager) -> bool {
        self.check_rels(rels, vars).is_sat()
    }

    /// Whether the premises provably imply the conclusion. `unknown` means
    /// "not proven", so the caller must keep the weaker form.
    pub fn implies(&self, premises: &[Rel], conclusion: &Rel, vars: &VariableManager) -> bool {
        let mut enc = Encoder::new(vars, PowPolicy::Reject);
        let mut terms = Vec::with_capacity(premises.len() + 1);
        for rel in premises {
            match enc.encode_rel(rel) {
                Some(t) => terms.push(t),
                None => return false,
            }
        }
        let Some(conclusion_term) = enc.encode_rel(conclusion) else {
            return false;
        };
        terms.push(conclusion_term.not());

        let mut all: Vec<Rel> = premises.to_vec();
        all.push(conclusion.clone());
        let names = declared_names(&all, vars, &enc.aux_vars);
        self.run(&terms, &names).is_unsat()
    }

    /// Raw term interface for the Farkas and limit-problem encodings.
    pub fn check_terms_with_model(
        &self,
        terms: &[SmtTerm],
        int_vars: &[String],
    ) -> (SatResult, Option<Model>) {
        let mut solver = self.solver();
        for name in int_vars {
            if solver.declare_var(name, &SmtSort::Int).is_err() {
                return (SatResult::Unknown("declare failed".into()), None);
            }
        }
        for term in terms {
            if solver.assert(term).is_err() {
                return (SatResult::Unknown("assert failed".into()), None);
            }
        }
        let decls: Vec<(&str, &SmtSort)> = int_vars
            .iter()
            .map(|n| (n.as_str(), &SmtSort::Int))
            .collect();
        match solver.check_sat_with_model(&decls) {
            Ok(res) => res,
            Err(e) => (SatResult::Unknown(e.to_string()), None),
        }
    }

    pub fn check_terms(&self, terms: &[SmtTerm], int_vars: &[String]) -> SatResult {
        let mut solver = self.solver();
        for name in int_vars {
            if solver.declare_var(name, &SmtSort::Int).is_err() {
                return SatResult::Unknown("declare failed".into());
            }
        }
        for term in terms {
            if solver.assert(term).is_err() {
                return SatResult::Unknown("assert failed".into());
            }
        }
        solver
            .check_sat()
            .unwrap_or_else(|e| SatResult::Unknown(e.to_string()))
    }

    fn run(&self, terms: &[SmtTerm], names: &[String]) -> SatResult {
        let mut solver = self.solver();
        for name in names {
            if solver.declare_var(name, &SmtSort::Int).is_err() {
                return SatResult::Unknown("declare failed".into());
            }
        }
        for term in terms {
            if solver.assert(term).is_err() {
                return SatResult::Unknown("assert failed".into());
            }
        }
        solver
            .check_sat()
            .unwrap_or_else(|e| SatResult::Unknown(e.to_string()))
    }
}

fn declared_names(rels: &[Rel], vars: &VariableManager, aux: &[String]) -> Vec<String> {
    let mut ids = IndexSet::new();
    for rel in rels {
        rel.collect_vars(&mut ids);
    }
    let mut names: Vec<String> = ids.iter().map(|id| vars.name(*id).to_string()).collect();
    names.extend(aux.iter().cloned());
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use loris_ir::expr::Expr;

    fn setup() -> VariableManager {
        let mut vars = VariableManager::new();
        vars.intern("x");
        vars.intern("y");
        vars
    }

    #[test]
    fn contradictory_guard_is_unsat() {
        let vars = setup();
        let oracle = SmtOracle::new(0);
        let rels = vec![
            Rel::gt(Expr::var(0), Expr::zero()),
            Rel::lt(Expr::var(0), Expr::zero()),
        ];
        assert!(oracle.check_rels(&rels, &vars).is_unsat());
        assert!(!oracle.consistent(&rels, &vars));
    }

    #[test]
    fn satisfiable_guard_is_sat() {
        let vars = setup();
        let oracle = SmtOracle::new(0);
        let rels = vec![
            Rel::gt(Expr::var(0), Expr::zero()),
            Rel::lt(Expr::var(0), Expr::var(1)),
        ];
        assert!(oracle.proven_sat(&rels, &vars));
    }

    #[test]
    fn implication_holds_for_strengthened_atom() {
        let vars = setup();
        let oracle = SmtOracle::new(0);
        // x > 1 implies x > 0
        let premise = vec![Rel::gt(Expr::var(0), Expr::one())];
        let conclusion = Rel::gt(Expr::var(0), Expr::zero());
        assert!(oracle.implies(&premise, &conclusion, &vars));
        // but not the other way around
        let premise = vec![Rel::gt(Expr::var(0), Expr::zero())];
        let conclusion = Rel::gt(Expr::var(0), Expr::one());
        assert!(!oracle.implies(&premise, &conclusion, &vars));
    }

    #[test]
    fn implication_refuses_unencodable_conclusions() {
        let vars = setup();
        let oracle = SmtOracle::new(0);
        let premise = vec![Rel::gt(Expr::var(0), Expr::zero())];
        let conclusion = Rel::ge(Expr::pow(Expr::int(2), Expr::var(0)), Expr::one());
        assert!(!oracle.implies(&premise, &conclusion, &vars));
    }

    #[test]
    fn term_interface_extracts_models() {
        let oracle = SmtOracle::new(0);
        let terms = vec![SmtTerm::var("c").eq(SmtTerm::int(3))];
        let names = vec!["c".to_string()];
        let (res, model) = oracle.check_terms_with_model(&terms, &names);
        assert!(res.is_sat());
        assert_eq!(model.unwrap().get_int("c"), Some(3));
    }
}
