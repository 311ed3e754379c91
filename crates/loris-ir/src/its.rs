use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::rule::Rule;
use crate::variables::VariableManager;

/// A unique identifier for a location.
pub type LocationId = usize;
/// A stable key for a rule in the arena. Never reused after removal.
pub type RuleId = usize;

/// A named control-flow location.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: String,
}

/// A mutable multigraph of locations and rules with indexed queries.
///
/// Rule ids are handed out from a monotone counter, so a removed rule's id
/// never comes back; callers must not use an id after `remove_rule`. Query
/// methods return snapshot copies, so the caller may mutate the graph while
/// iterating over a query result.
#[derive(Debug, Clone, Default)]
pub struct ItsProblem {
    pub vars: VariableManager,
    locations: Vec<Location>,
    initial: LocationId,
    rules: BTreeMap<RuleId, Rule>,
    next_rule: RuleId,
    out_index: HashMap<LocationId, BTreeSet<RuleId>>,
    in_index: HashMap<LocationId, BTreeSet<RuleId>>,
}

impl ItsProblem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_location(&mut self, name: impl Into<String>) -> LocationId {
        let id = self.locations.len();
        self.locations.push(Location { name: name.into() });
        id
    }

    pub fn location_name(&self, loc: LocationId) -> &str {
        &self.locations[loc].name
    }

    pub fn locations(&self) -> impl Iterator<Item = LocationId> {
        0..self.locations.len()
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    pub fn set_initial(&mut self, loc: LocationId) {
        debug_assert!(loc < self.locations.len());
        self.initial = loc;
    }

    pub fn initial_location(&self) -> LocationId {
        self.initial
    }

    pub fn is_initial(&self, loc: LocationId) -> bool {
        self.initial == loc
    }

    pub fn add_rule(&mut self, rule: Rule) -> RuleId {
        debug_assert!(rule.source < self.locations.len());
        debug_assert!(rule.rhss.iter().all(|rhs| rhs.target < self.locations.len()));
        let id = self.next_rule;
        self.next_rule += 1;
        self.out_index.entry(rule.source).or_default().insert(id);
        for target in rule.targets().collect::<BTreeSet<_>>() {
            self.in_index.entry(target).or_default().insert(id);
        }
        self.rules.insert(id, rule);
        id
    }

    pub fn remove_rule(&mut self, id: RuleId) -> Option<Rule> {
        let rule = self.rules.remove(&id)?;
        if let Some(set) = self.out_index.get_mut(&rule.source) {
            set.remove(&id);
        }
        for target in rule.targets().collect::<BTreeSet<_>>() {
            if let Some(set) = self.in_index.get_mut(&target) {
                set.remove(&id);
            }
        }
        Some(rule)
    }

    pub fn has_rule(&self, id: RuleId) -> bool {
        self.rules.contains_key(&id)
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[&id]
    }

    pub fn rule_mut(&mut self, id: RuleId) -> &mut Rule {
        self.rules.get_mut(&id).expect("stale rule id")
    }

    /// All rules in ascending id order.
    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &Rule)> + '_ {
        self.rules.iter().map(|(id, r)| (*id, r))
    }

    pub fn rule_ids(&self) -> Vec<RuleId> {
        self.rules.keys().copied().collect()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rules_from(&self, loc: LocationId) -> Vec<RuleId> {
        self.out_index
            .get(&loc)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn rules_to(&self, loc: LocationId) -> Vec<RuleId> {
        self.in_index
            .get(&loc)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn rules_from_to(&self, source: LocationId, target: LocationId) -> Vec<RuleId> {
        self.rules_from(source)
            .into_iter()
            .filter(|id| self.rule(*id).targets().any(|t| t == target))
            .collect()
    }

    pub fn has_rules_from(&self, loc: LocationId) -> bool {
        self.out_index.get(&loc).is_some_and(|set| !set.is_empty())
    }

    pub fn has_rules_to(&self, loc: LocationId) -> bool {
        self.in_index.get(&loc).is_some_and(|set| !set.is_empty())
    }

    pub fn successors(&self, loc: LocationId) -> Vec<LocationId> {
        let mut out = BTreeSet::new();
        for id in self.rules_from(loc) {
            out.extend(self.rule(id).targets());
        }
        out.into_iter().collect()
    }

    pub fn predecessors(&self, loc: LocationId) -> Vec<LocationId> {
        let mut out = BTreeSet::new();
        for id in self.rules_to(loc) {
            out.insert(self.rule(id).source);
        }
        out.into_iter().collect()
    }

    /// Rules that loop from `loc` straight back to `loc`.
    pub fn simple_loops_at(&self, loc: LocationId) -> Vec<RuleId> {
        self.rules_from(loc)
            .into_iter()
            .filter(|id| self.rule(*id).is_simple_loop())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn is_linear(&self) -> bool {
        self.rules.values().all(|r| r.is_linear())
    }
}

impl fmt::Display for ItsProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Start location: {}", self.location_name(self.initial))?;
        if self.rules.is_empty() {
            writeln!(f, "  <empty>")?;
            return Ok(());
        }
        for (id, rule) in self.rules() {
            write!(
                f,
                "  {id:3}: {} -> ",
                self.location_name(rule.source)
            )?;
            for (i, rhs) in rule.rhss.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", self.location_name(rhs.target))?;
            }
            write!(
                f,
                " : [{}], cost {}",
                rule.guard.display(&self.vars),
                rule.cost.display(&self.vars)
            )?;
            for rhs in &rule.rhss {
                if !rhs.update.is_empty() {
                    write!(f, ", {}", rhs.update.display(&self.vars))?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
