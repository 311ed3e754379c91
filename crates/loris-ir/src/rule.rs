use indexmap::{IndexMap, IndexSet};
use std::fmt;

use crate::expr::{Expr, Subs};
use crate::its::LocationId;
use crate::rel::Guard;
use crate::variables::{VarId, VariableManager};

/// Simultaneous assignment to a subset of variables. Variables without an
/// entry are identity-updated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Update(pub IndexMap<VarId, Expr>);

impl Update {
    pub fn new() -> Update {
        Update(IndexMap::new())
    }

    pub fn get(&self, var: VarId) -> Option<&Expr> {
        self.0.get(&var)
    }

    pub fn set(&mut self, var: VarId, rhs: Expr) {
        self.0.insert(var, rhs);
    }

    pub fn remove(&mut self, var: VarId) -> Option<Expr> {
        self.0.shift_remove(&var)
    }

    pub fn updates(&self, var: VarId) -> bool {
        self.0.contains_key(&var)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, VarId, Expr> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> indexmap::map::IterMut<'_, VarId, Expr> {
        self.0.iter_mut()
    }

    /// The update as a substitution map (identity entries implicit).
    pub fn as_subs(&self) -> Subs {
        self.0.clone()
    }

    /// Applies a substitution to every right-hand side.
    pub fn subs_rhs(&self, map: &Subs) -> Update {
        Update(
            self.0
                .iter()
                .map(|(v, e)| (*v, e.subs(map)))
                .collect(),
        )
    }

    /// Composition `self ∘ first`: the update describing "apply `first`,
    /// then `self`" as one simultaneous step.
    pub fn compose_after(&self, first: &Update) -> Update {
        let first_subs = first.as_subs();
        let mut out = IndexMap::new();
        for (v, e) in &self.0 {
            out.insert(*v, e.subs(&first_subs));
        }
        for (v, e) in &first.0 {
            out.entry(*v).or_insert_with(|| e.clone());
        }
        Update(out)
    }

    /// Variables occurring on any right-hand side.
    pub fn collect_rhs_vars(&self, out: &mut IndexSet<VarId>) {
        for e in self.0.values() {
            e.collect_vars(out);
        }
    }

    pub fn display<'a>(&'a self, vars: &'a VariableManager) -> UpdateDisplay<'a> {
        UpdateDisplay { update: self, vars }
    }
}

pub struct UpdateDisplay<'a> {
    update: &'a Update,
    vars: &'a VariableManager,
}

impl fmt::Display for UpdateDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (v, e)) in self.update.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} := {}", self.vars.name(*v), e.display(self.vars))?;
        }
        Ok(())
    }
}

/// One right-hand side of a rule: a target location plus the update
/// applied when moving there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRhs {
    pub target: LocationId,
    pub update: Update,
}

/// A transition rule. The linear case has exactly one right-hand side;
/// non-linear rules fan out into several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub source: LocationId,
    pub guard: Guard,
    pub cost: Expr,
    pub rhss: Vec<RuleRhs>,
}

impl Rule {
    pub fn linear(
        source: LocationId,
        guard: Guard,
        cost: Expr,
        target: LocationId,
        update: Update,
    ) -> Rule {
        Rule {
            source,
            guard,
            cost,
            rhss: vec![RuleRhs { target, update }],
        }
    }

    /// A guard-free, cost-free rule connecting two locations. Used to give
    /// the graph a proper initial location.
    pub fn dummy(source: LocationId, target: LocationId) -> Rule {
        Rule::linear(source, Guard::trivial(), Expr::zero(), target, Update::new())
    }

    pub fn is_linear(&self) -> bool {
        self.rhss.len() == 1
    }

    /// Target of a linear rule (the first right-hand side otherwise).
    pub fn target(&self) -> LocationId {
        self.rhss[0].target
    }

    /// Update of a linear rule (the first right-hand side otherwise).
    pub fn update(&self) -> &Update {
        &self.rhss[0].update
    }

    pub fn update_mut(&mut self) -> &mut Update {
        &mut self.rhss[0].update
    }

    /// True when every right-hand side loops back to the source.
    pub fn is_simple_loop(&self) -> bool {
        self.rhss.iter().all(|rhs| rhs.target == self.source)
    }

    pub fn targets(&self) -> impl Iterator<Item = LocationId> + '_ {
        self.rhss.iter().map(|rhs| rhs.target)
    }

    /// Applies a substitution to guard, cost and all update right-hand
    /// sides (update keys are left alone).
    pub fn subs(&self, map: &Subs) -> Rule {
        Rule {
            source: self.source,
            guard: self.guard.subs(map),
            cost: self.cost.subs(map),
            rhss: self
                .rhss
                .iter()
                .map(|rhs| RuleRhs {
                    target: rhs.target,
                    update: rhs.update.subs_rhs(map),
                })
                .collect(),
        }
    }

    /// Every variable occurring in guard, cost, or update right-hand sides.
    pub fn collect_vars(&self, out: &mut IndexSet<VarId>) {
        self.guard.collect_vars(out);
        self.cost.collect_vars(out);
        for rhs in &self.rhss {
            rhs.update.collect_rhs_vars(out);
        }
    }

    pub fn vars(&self) -> IndexSet<VarId> {
        let mut out = IndexSet::new();
        self.collect_vars(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::rel::Rel;

    fn x() -> Expr {
        Expr::var(0)
    }

    fn y() -> Expr {
        Expr::var(1)
    }

    #[test]
    fn compose_after_is_sequential_application() {
        // first: x := x + 1; second: y := x  =>  y ends up as x + 1
        let mut first = Update::new();
        first.set(0, x() + Expr::one());
        let mut second = Update::new();
        second.set(1, x());
        let composed = second.compose_after(&first);
        assert_eq!(composed.get(1), Some(&(x() + Expr::one())));
        assert_eq!(composed.get(0), Some(&(x() + Expr::one())));
    }

    #[test]
    fn compose_after_keeps_untouched_first_entries() {
        let mut first = Update::new();
        first.set(0, Expr::int(5));
        let second = Update::new();
        let composed = second.compose_after(&first);
        assert_eq!(composed.get(0), Some(&Expr::int(5)));
    }

    #[test]
    fn simple_loop_detection() {
        let mut u = Update::new();
        u.set(0, x() - Expr::one());
        let r = Rule::linear(3, Guard::single(Rel::gt(x(), Expr::zero())), Expr::one(), 3, u);
        assert!(r.is_simple_loop());
        assert!(r.is_linear());
        let r2 = Rule::dummy(0, 1);
        assert!(!r2.is_simple_loop());
        assert!(r2.cost.is_zero());
    }

    #[test]
    fn rule_substitution_touches_guard_cost_and_update_rhs() {
        let mut u = Update::new();
        u.set(0, y());
        let rule = Rule::linear(
            0,
            Guard::single(Rel::gt(y(), Expr::zero())),
            y(),
            1,
            u,
        );
        let renamed = rule.subs(&Subs::from_iter([(1, x())]));
        assert_eq!(renamed.guard.atoms[0], Rel::gt(x(), Expr::zero()));
        assert_eq!(renamed.cost, x());
        assert_eq!(renamed.update().get(0), Some(&x()));
    }
}
