//! Output artifacts: KoAT re-emission of the simplified problem and dot
//! subgraphs of the simplification steps.

use std::fmt::Write as _;

use loris_ir::ItsProblem;

/// Renders the problem back into KoAT syntax. Every location is printed
/// with the full program-variable vector; updates fill in the argument
/// positions.
pub fn print_koat(its: &ItsProblem) -> String {
    let program_vars: Vec<_> = its
        .vars
        .all_vars()
        .filter(|v| !its.vars.is_temp(*v))
        .collect();

    let mut out = String::new();
    out.push_str("(GOAL COMPLEXITY)\n");
    let _ = writeln!(
        out,
        "(STARTTERM (FUNCTIONSYMBOLS {}))",
        its.location_name(its.initial_location())
    );
    out.push_str("(VAR");
    for &v in &program_vars {
        let _ = write!(out, " {}", its.vars.name(v));
    }
    out.push_str(")\n(RULES\n");

    for (_, rule) in its.rules() {
        let _ = write!(out, "  {}(", its.location_name(rule.source));
        for (i, &v) in program_vars.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}", its.vars.name(v));
        }
        let _ = write!(out, ") -{{ {} }}> ", rule.cost.display(&its.vars));
        if rule.rhss.len() != 1 {
            let _ = write!(out, "Com_{}(", rule.rhss.len());
        }
        for (k, rhs) in rule.rhss.iter().enumerate() {
            if k > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}(", its.location_name(rhs.target));
            for (i, &v) in program_vars.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match rhs.update.get(v) {
                    Some(e) => {
                        let _ = write!(out, "{}", e.display(&its.vars));
                    }
                    None => {
                        let _ = write!(out, "{}", its.vars.name(v));
                    }
                }
            }
            out.push(')');
        }
        if rule.rhss.len() != 1 {
            out.push(')');
        }
        if !rule.guard.is_empty() {
            let _ = write!(out, " :|: {}", rule.guard.display(&its.vars));
        }
        out.push('\n');
    }
    out.push_str(")\n");
    out
}

/// Collects dot subgraphs, one cluster per simplification step, the way
/// graphviz renders a timeline of the analysis.
#[derive(Debug, Clone, Default)]
pub struct DotOutput {
    buf: String,
    step: usize,
}

impl DotOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subgraph(&mut self, its: &ItsProblem, description: &str) {
        let step = self.step;
        self.step += 1;
        let _ = writeln!(self.buf, "subgraph cluster_{step} {{");
        let _ = writeln!(self.buf, "sortv={step};");
        let _ = writeln!(self.buf, "label=\"{step}: {}\";", escape(description));
        for loc in its.locations() {
            let _ = writeln!(
                self.buf,
                "node_{step}_{loc} [label=\"{}\"];",
                escape(its.location_name(loc))
            );
        }
        for src in its.locations() {
            for dst in its.successors(src) {
                let mut label = String::new();
                for id in its.rules_from_to(src, dst) {
                    let rule = its.rule(id);
                    let _ = write!(
                        label,
                        "({}): {} [{}]\\l",
                        id,
                        rule.cost.display(&its.vars),
                        rule.guard.display(&its.vars)
                    );
                }
                let _ = writeln!(
                    self.buf,
                    "node_{step}_{src} -> node_{step}_{dst} [label=\"{}\"];",
                    escape(&label)
                );
            }
        }
        let _ = writeln!(self.buf, "}}");
    }

    pub fn result(&mut self, text: &str) {
        let step = self.step;
        self.step += 1;
        let _ = writeln!(self.buf, "subgraph cluster_{step} {{");
        let _ = writeln!(self.buf, "sortv={step};");
        let _ = writeln!(self.buf, "label=\"{step}: Result\";");
        let _ = writeln!(self.buf, "node_{step}_result [label=\"{}\"];", escape(text));
        let _ = writeln!(self.buf, "}}");
    }

    pub fn finish(self) -> String {
        format!("digraph {{\n{}}}\n", self.buf)
    }
}

fn escape(s: &str) -> String {
    s.replace('"', "'").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use loris_ir::expr::Expr;
    use loris_ir::rel::{Guard, Rel};
    use loris_ir::rule::{Rule, Update};

    fn sample() -> ItsProblem {
        let mut its = ItsProblem::new();
        let x = its.vars.intern("x");
        its.vars.fresh("free", true);
        let l0 = its.add_location("l0");
        let l1 = its.add_location("l1");
        its.set_initial(l0);
        let mut u = Update::new();
        u.set(x, Expr::var(x) - Expr::one());
        its.add_rule(Rule::linear(
            l0,
            Guard::single(Rel::gt(Expr::var(x), Expr::zero())),
            Expr::var(x),
            l1,
            u,
        ));
        its
    }

    #[test]
    fn koat_emission_roundtrips_through_the_parser() {
        let its = sample();
        let koat = print_koat(&its);
        assert!(koat.contains("(GOAL COMPLEXITY)"));
        assert!(koat.contains("(STARTTERM (FUNCTIONSYMBOLS l0))"));
        assert!(koat.contains("l0(x) -{ x }> l1(-1 + x) :|: x > 0"));
        // and the emitted text parses again
        let reparsed = loris_koat::parse_problem(&koat, "reemitted").unwrap();
        assert_eq!(reparsed.rule_count(), 1);
        assert_eq!(reparsed.location_count(), 2);
    }

    #[test]
    fn temporaries_are_not_declared() {
        let its = sample();
        let koat = print_koat(&its);
        assert!(koat.contains("(VAR x)"));
        assert!(!koat.contains("free"));
    }

    #[test]
    fn dot_output_wraps_clusters_in_a_digraph() {
        let its = sample();
        let mut dot = DotOutput::new();
        dot.subgraph(&its, "Initial");
        dot.result("O(n)");
        let text = dot.finish();
        assert!(text.starts_with("digraph {"));
        assert!(text.contains("cluster_0"));
        assert!(text.contains("label=\"0: Initial\";"));
        assert!(text.contains("cluster_1"));
        assert!(text.ends_with("}\n"));
    }
}
