use loris_ir::{Complexity, Expr, Guard, ItsProblem};

/// The overall outcome of an analysis: the proven lower-bound class, the
/// witnessing cost expression, and the guard admitting the witnessing
/// family of models.
#[derive(Debug, Clone)]
pub struct RuntimeResult {
    pub cpx: Complexity,
    pub bound: Expr,
    /// Complexity after accounting for how fast the witnessing models
    /// grow in the parameter; can be below `cpx` for non-linear
    /// template solutions.
    pub reduced_cpx: Complexity,
    pub guard: Guard,
}

impl Default for RuntimeResult {
    fn default() -> Self {
        Self {
            cpx: Complexity::Unknown,
            bound: Expr::zero(),
            reduced_cpx: Complexity::Unknown,
            guard: Guard::trivial(),
        }
    }
}

impl RuntimeResult {
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Human-readable summary.
    pub fn render(&self, its: &ItsProblem) -> String {
        let mut out = String::new();
        out.push_str(&format!("Obtained lower bound: {}\n", self.cpx));
        out.push_str(&format!("  Cost: {}\n", self.bound.display(&its.vars)));
        out.push_str(&format!("  Guard: {}\n", self.guard.display(&its.vars)));
        if self.reduced_cpx != self.cpx {
            out.push_str(&format!("  Reduced: {}\n", self.reduced_cpx));
        }
        out
    }

    /// Machine-readable view for the CLI's `--format json`.
    pub fn to_json(&self, its: &ItsProblem) -> serde_json::Value {
        serde_json::json!({
            "complexity": self.cpx.to_string(),
            "bound": self.bound.display(&its.vars).to_string(),
            "guard": self.guard.display(&its.vars).to_string(),
            "reduced_complexity": self.reduced_cpx.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unknown() {
        let res = RuntimeResult::default();
        assert_eq!(res.cpx, Complexity::Unknown);
        assert!(res.guard.is_empty());
    }

    #[test]
    fn json_view_uses_display_strings() {
        let its = ItsProblem::new();
        let res = RuntimeResult {
            cpx: Complexity::Poly(2),
            bound: Expr::int(7),
            reduced_cpx: Complexity::Poly(2),
            guard: Guard::trivial(),
        };
        let json = res.to_json(&its);
        assert_eq!(json["complexity"], "O(n^2)");
        assert_eq!(json["bound"], "7");
    }
}
