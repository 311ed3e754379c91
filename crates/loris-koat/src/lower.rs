#![allow(clippy::result_large_err)]

use indexmap::{IndexMap, IndexSet};
use num::{BigRational, Signed};

use loris_ir::expr::{Expr, Subs};
use loris_ir::its::{ItsProblem, LocationId};
use loris_ir::rel::{Guard, Rel};
use loris_ir::rule::{Rule, RuleRhs, Update};
use loris_ir::variables::VarId;

use crate::ast::{Cond, FunApp, KoatFile, KoatRule, PExpr, StartTerm};
use crate::errors::ParseError;
use crate::parser;

/// Parse and lower KoAT source text into an ITS problem.
pub fn parse_problem(source: &str, filename: &str) -> Result<ItsProblem, ParseError> {
    let file = parser::parse(source, filename)?;
    lower(&file, source, filename)
}

/// Load a KoAT file from disk.
pub fn load_file(path: &std::path::Path) -> Result<ItsProblem, ParseError> {
    let source = std::fs::read_to_string(path).map_err(|e| ParseError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let filename = path.display().to_string();
    parse_problem(&source, &filename)
}

/// Escapes a variable name into the identifier alphabet the engine uses:
/// `I` becomes `Q`, other non-alphanumerics become `_`, and a leading
/// non-letter is prefixed with `q`.
pub fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    for ch in name.chars() {
        if ch == 'I' {
            out.push('Q');
        } else if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if !out.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        out.insert(0, 'q');
    }
    out
}

/// Lower a parsed file into an [`ItsProblem`].
///
/// Function symbols become locations. The first left-hand-side occurrence
/// of a symbol fixes its variable signature; later occurrences with other
/// argument names are renamed to the canonical ones. Variables that occur
/// on a right-hand side, cost or guard without being bound by the lhs are
/// replaced by fresh temporaries, one per rule.
pub fn lower(file: &KoatFile, source: &str, filename: &str) -> Result<ItsProblem, ParseError> {
    let mut lo = Lowerer {
        source,
        filename,
        its: ItsProblem::new(),
        locations: IndexMap::new(),
        signatures: IndexMap::new(),
        declared: IndexMap::new(),
    };

    for name in &file.vars {
        let escaped = escape_name(name);
        let id = lo.its.vars.intern(&escaped);
        lo.declared.insert(escaped, id);
    }

    lo.collect_signatures(file)?;
    for rule in &file.rules {
        lo.lower_rule(rule)?;
    }

    let initial = match &file.start {
        StartTerm::Symbol(name) => {
            *lo.locations
                .get(name.as_str())
                .ok_or_else(|| ParseError::UnknownStartTerm { name: name.clone() })?
        }
        StartTerm::ConstructorBased => {
            let first = &file.rules[0].lhs.name;
            *lo.locations.get(first.as_str()).expect("first lhs location")
        }
    };
    lo.its.set_initial(initial);
    Ok(lo.its)
}

struct Lowerer<'a> {
    source: &'a str,
    filename: &'a str,
    its: ItsProblem,
    locations: IndexMap<String, LocationId>,
    signatures: IndexMap<LocationId, Vec<VarId>>,
    declared: IndexMap<String, VarId>,
}

impl Lowerer<'_> {
    fn src(&self) -> miette::NamedSource<String> {
        miette::NamedSource::new(self.filename, self.source.to_string())
    }

    fn location(&mut self, name: &str) -> LocationId {
        if let Some(&loc) = self.locations.get(name) {
            return loc;
        }
        let loc = self.its.add_location(name);
        self.locations.insert(name.to_string(), loc);
        loc
    }

    /// First pass: fix every symbol's signature. Left-hand sides win; a
    /// symbol only ever used as a target gets fresh temporary slots.
    fn collect_signatures(&mut self, file: &KoatFile) -> Result<(), ParseError> {
        for rule in &file.rules {
            let loc = self.location(&rule.lhs.name);
            if let Some(sig) = self.signatures.get(&loc) {
                if sig.len() != rule.lhs.args.len() {
                    return Err(ParseError::ArityMismatch {
                        name: rule.lhs.name.clone(),
                        expected: sig.len(),
                        found: rule.lhs.args.len(),
                        span: rule.lhs.span.into(),
                        src: self.src(),
                    });
                }
                continue;
            }
            let mut sig = Vec::with_capacity(rule.lhs.args.len());
            for arg in &rule.lhs.args {
                match arg {
                    PExpr::Var(name, span) => {
                        let escaped = escape_name(name);
                        let id = self.declared.get(&escaped).copied().ok_or_else(|| {
                            ParseError::UnknownVariable {
                                name: name.clone(),
                                span: (*span).into(),
                                src: self.src(),
                            }
                        })?;
                        sig.push(id);
                    }
                    PExpr::Num(_) => {
                        // A constant argument position still needs a slot;
                        // the rule itself constrains it in the guard.
                        sig.push(self.its.vars.fresh("x", true));
                    }
                    _ => {
                        return Err(ParseError::UnsupportedLhsArg {
                            span: rule.lhs.span.into(),
                            src: self.src(),
                        })
                    }
                }
            }
            self.signatures.insert(loc, sig);
        }

        // Pure sinks: symbols that never occur on a left-hand side.
        for rule in &file.rules {
            for rhs in &rule.rhs {
                let loc = self.location(&rhs.name);
                if self.signatures.contains_key(&loc) {
                    continue;
                }
                let sig = (0..rhs.args.len())
                    .map(|i| {
                        let base = escape_name(&format!("{}{}", rhs.name, i));
                        self.its.vars.fresh(&base, true)
                    })
                    .collect();
                self.signatures.insert(loc, sig);
            }
        }
        Ok(())
    }

    fn lower_rule(&mut self, rule: &KoatRule) -> Result<(), ParseError> {
        let source_loc = self.location(&rule.lhs.name);
        let sig = self.signatures[&source_loc].clone();

        // Rename this rule's lhs argument names to the canonical signature
        // and pin constant argument positions in the guard.
        let mut rename = Subs::new();
        let mut guard = Guard::trivial();
        for (i, arg) in rule.lhs.args.iter().enumerate() {
            match arg {
                PExpr::Var(name, span) => {
                    let escaped = escape_name(name);
                    let id = self.declared.get(&escaped).copied().ok_or_else(|| {
                        ParseError::UnknownVariable {
                            name: name.clone(),
                            span: (*span).into(),
                            src: self.src(),
                        }
                    })?;
                    if id != sig[i] {
                        rename.insert(id, Expr::var(sig[i]));
                    }
                }
                PExpr::Num(n) => {
                    guard.push(Rel::eq(
                        Expr::var(sig[i]),
                        Expr::num(BigRational::from(n.clone())),
                    ));
                }
                _ => {
                    return Err(ParseError::UnsupportedLhsArg {
                        span: rule.lhs.span.into(),
                        src: self.src(),
                    })
                }
            }
        }

        for cond in &rule.guard {
            match cond {
                Cond::True => {}
                Cond::Cmp { lhs, op, rhs, .. } => {
                    let l = self.resolve(lhs)?;
                    let r = self.resolve(rhs)?;
                    guard.push(Rel::new(l, *op, r));
                }
            }
        }

        let cost = match &rule.cost {
            None => Expr::one(),
            Some(expr) => {
                let cost = self.resolve(expr)?;
                if !cost.is_polynomial() {
                    return Err(ParseError::NonPolynomialCost {
                        span: rule.span.into(),
                        src: self.src(),
                    });
                }
                // User-given costs must be non-negative under the guard.
                let trivially_nonneg =
                    matches!(cost.as_num(), Some(n) if !n.is_negative());
                if !trivially_nonneg {
                    guard.push(Rel::ge(cost.clone(), Expr::zero()));
                }
                cost
            }
        };

        let mut rhss = Vec::with_capacity(rule.rhs.len());
        for app in &rule.rhs {
            rhss.push(self.lower_rhs(app)?);
        }

        let mut lowered = Rule {
            source: source_loc,
            guard,
            cost,
            rhss,
        };
        lowered = lowered.subs(&rename);

        // Unbound variables are existentially quantified per rule: replace
        // each one by a fresh temporary.
        let bound: IndexSet<VarId> = sig.iter().copied().collect();
        let mut fresh_subs = Subs::new();
        for var in lowered.vars() {
            if !bound.contains(&var) && !fresh_subs.contains_key(&var) {
                let temp = self.its.vars.fresh("free", true);
                fresh_subs.insert(var, Expr::var(temp));
            }
        }
        if !fresh_subs.is_empty() {
            lowered = lowered.subs(&fresh_subs);
        }

        // Drop identity updates introduced by verbatim argument passing.
        for rhs in &mut lowered.rhss {
            let identities: Vec<VarId> = rhs
                .update
                .iter()
                .filter(|(v, e)| matches!(e, Expr::Var(w) if w == *v))
                .map(|(v, _)| *v)
                .collect();
            for v in identities {
                rhs.update.remove(v);
            }
        }

        self.its.add_rule(lowered);
        Ok(())
    }

    fn lower_rhs(&mut self, app: &FunApp) -> Result<RuleRhs, ParseError> {
        let target = self.location(&app.name);
        let sig = self.signatures[&target].clone();
        if sig.len() != app.args.len() {
            return Err(ParseError::ArityMismatch {
                name: app.name.clone(),
                expected: sig.len(),
                found: app.args.len(),
                span: app.span.into(),
                src: self.src(),
            });
        }
        let mut update = Update::new();
        for (i, arg) in app.args.iter().enumerate() {
            update.set(sig[i], self.resolve(arg)?);
        }
        Ok(RuleRhs { target, update })
    }

    fn resolve(&self, expr: &PExpr) -> Result<Expr, ParseError> {
        match expr {
            PExpr::Num(n) => Ok(Expr::num(BigRational::from(n.clone()))),
            PExpr::Var(name, span) => {
                let escaped = escape_name(name);
                self.declared
                    .get(&escaped)
                    .map(|id| Expr::var(*id))
                    .ok_or_else(|| ParseError::UnknownVariable {
                        name: name.clone(),
                        span: (*span).into(),
                        src: self.src(),
                    })
            }
            PExpr::Neg(inner) => Ok(-self.resolve(inner)?),
            PExpr::Add(l, r) => Ok(self.resolve(l)? + self.resolve(r)?),
            PExpr::Sub(l, r) => Ok(self.resolve(l)? - self.resolve(r)?),
            PExpr::Mul(l, r) => Ok(self.resolve(l)? * self.resolve(r)?),
            PExpr::Div(_, _, span) => Err(ParseError::Division {
                span: (*span).into(),
                src: self.src(),
            }),
            PExpr::Pow(b, e) => Ok(Expr::pow(self.resolve(b)?, self.resolve(e)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower_src(src: &str) -> ItsProblem {
        parse_problem(src, "test.koat").unwrap()
    }

    #[test]
    fn single_counter_lowers_to_a_self_loop() {
        let its = lower_src(
            r#"
(GOAL COMPLEXITY)
(STARTTERM (FUNCTIONSYMBOLS l0))
(VAR x)
(RULES
  l0(x) -> l0(x - 1) [ x > 0 ]
)
"#,
        );
        assert_eq!(its.location_count(), 1);
        assert_eq!(its.rule_count(), 1);
        let (_, rule) = its.rules().next().unwrap();
        assert!(rule.is_simple_loop());
        assert_eq!(rule.cost, Expr::one());
        let x = its.vars.lookup("x").unwrap();
        assert_eq!(
            rule.update().get(x),
            Some(&(Expr::var(x) - Expr::one()))
        );
        assert_eq!(rule.guard.len(), 1);
        assert!(!its.vars.is_temp(x));
    }

    #[test]
    fn unbound_variables_become_fresh_temporaries() {
        let its = lower_src(
            r#"
(GOAL COMPLEXITY)
(STARTTERM (FUNCTIONSYMBOLS l))
(VAR x t)
(RULES
  l(x) -{ t }> l(x - 1) [ x > 0 && t > 0 ]
)
"#,
        );
        let (_, rule) = its.rules().next().unwrap();
        let t = its.vars.lookup("t").unwrap();
        // t itself was not bound on the lhs, so the rule must not mention it
        assert!(!rule.cost.has_var(t));
        let free = its.vars.lookup("free").unwrap();
        assert!(its.vars.is_temp(free));
        assert_eq!(rule.cost, Expr::var(free));
        // the explicit cost got a non-negativity atom appended
        assert_eq!(rule.guard.len(), 3);
    }

    #[test]
    fn later_occurrences_are_renamed_to_the_canonical_signature() {
        let its = lower_src(
            r#"
(GOAL COMPLEXITY)
(STARTTERM (FUNCTIONSYMBOLS f))
(VAR x y z)
(RULES
  f(x, y) -> g(x)
  f(z, y) -> g(y) [ z > 0 ]
  g(x) -> g(x - 1) [ x > 0 ]
)
"#,
        );
        // the second f-rule's z must have been renamed to x
        let x = its.vars.lookup("x").unwrap();
        let z = its.vars.lookup("z").unwrap();
        let ids = its.rule_ids();
        let second = its.rule(ids[1]);
        assert!(second.guard.atoms[0].has_var(x));
        assert!(!second.guard.atoms[0].has_var(z));
    }

    #[test]
    fn numeric_lhs_arguments_move_into_the_guard() {
        let its = lower_src(
            r#"
(GOAL COMPLEXITY)
(STARTTERM (FUNCTIONSYMBOLS f))
(VAR x)
(RULES
  f(0) -> f(x)
)
"#,
        );
        let (_, rule) = its.rules().next().unwrap();
        assert_eq!(rule.guard.len(), 1);
        assert!(rule.guard.atoms[0].is_equality());
    }

    #[test]
    fn division_is_rejected() {
        let err = parse_problem(
            r#"
(GOAL COMPLEXITY)
(STARTTERM (FUNCTIONSYMBOLS f))
(VAR x)
(RULES
  f(x) -> f(x / 2) [ x > 1 ]
)
"#,
            "test.koat",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::Division { .. }));
    }

    #[test]
    fn nonpolynomial_cost_is_rejected() {
        let err = parse_problem(
            r#"
(GOAL COMPLEXITY)
(STARTTERM (FUNCTIONSYMBOLS f))
(VAR x)
(RULES
  f(x) -{ 2^x }> f(x - 1) [ x > 0 ]
)
"#,
            "test.koat",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::NonPolynomialCost { .. }));
    }

    #[test]
    fn variable_names_are_escaped() {
        let its = lower_src(
            r#"
(GOAL COMPLEXITY)
(STARTTERM (FUNCTIONSYMBOLS f))
(VAR I x')
(RULES
  f(I, x') -> f(I - 1, x') [ I > 0 ]
)
"#,
        );
        assert!(its.vars.lookup("Q").is_some());
        assert!(its.vars.lookup("x_").is_some());
        assert!(its.vars.lookup("I").is_none());
    }

    #[test]
    fn com_wrappers_fan_out_into_multiple_rhss() {
        let its = lower_src(
            r#"
(GOAL COMPLEXITY)
(STARTTERM (FUNCTIONSYMBOLS f))
(VAR x)
(RULES
  f(x) -> Com_2(f(x - 1), f(x - 2)) [ x > 1 ]
)
"#,
        );
        let (_, rule) = its.rules().next().unwrap();
        assert_eq!(rule.rhss.len(), 2);
        assert!(!rule.is_linear());
        assert!(!its.is_linear());
    }

    #[test]
    fn unknown_start_symbol_is_an_error() {
        let err = parse_problem(
            r#"
(GOAL COMPLEXITY)
(STARTTERM (FUNCTIONSYMBOLS nowhere))
(VAR x)
(RULES
  f(x) -> f(x)
)
"#,
            "test.koat",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::UnknownStartTerm { .. }));
    }
}
