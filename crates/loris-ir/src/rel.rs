use indexmap::IndexSet;
use num::{Signed, Zero};
use std::fmt;

use crate::expr::{Expr, Subs};
use crate::variables::{VarId, VariableManager};

/// Comparison operator of a guard atom. Disequality is not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl CmpOp {
    /// The operator with both sides swapped.
    pub fn flipped(self) -> CmpOp {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
            CmpOp::Eq => CmpOp::Eq,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmpOp::Lt => write!(f, "<"),
            CmpOp::Le => write!(f, "<="),
            CmpOp::Gt => write!(f, ">"),
            CmpOp::Ge => write!(f, ">="),
            CmpOp::Eq => write!(f, "=="),
        }
    }
}

/// A single guard atom `lhs op rhs` over integer-valued expressions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rel {
    pub lhs: Expr,
    pub op: CmpOp,
    pub rhs: Expr,
}

impl Rel {
    pub fn new(lhs: Expr, op: CmpOp, rhs: Expr) -> Rel {
        Rel { lhs, op, rhs }
    }

    pub fn ge(lhs: Expr, rhs: Expr) -> Rel {
        Rel::new(lhs, CmpOp::Ge, rhs)
    }

    pub fn gt(lhs: Expr, rhs: Expr) -> Rel {
        Rel::new(lhs, CmpOp::Gt, rhs)
    }

    pub fn le(lhs: Expr, rhs: Expr) -> Rel {
        Rel::new(lhs, CmpOp::Le, rhs)
    }

    pub fn lt(lhs: Expr, rhs: Expr) -> Rel {
        Rel::new(lhs, CmpOp::Lt, rhs)
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Rel {
        Rel::new(lhs, CmpOp::Eq, rhs)
    }

    pub fn is_equality(&self) -> bool {
        self.op == CmpOp::Eq
    }

    pub fn is_inequality(&self) -> bool {
        !self.is_equality()
    }

    /// Rewrites an inequality into `lhs <= rhs` form, using integer
    /// semantics for strictness (`a < b` becomes `a <= b - 1`).
    pub fn to_le(&self) -> Rel {
        debug_assert!(self.is_inequality());
        let (lhs, op, rhs) = match self.op {
            CmpOp::Gt => (self.rhs.clone(), CmpOp::Lt, self.lhs.clone()),
            CmpOp::Ge => (self.rhs.clone(), CmpOp::Le, self.lhs.clone()),
            _ => (self.lhs.clone(), self.op, self.rhs.clone()),
        };
        match op {
            CmpOp::Lt => Rel::le(lhs, rhs - Expr::one()),
            _ => Rel::le(lhs, rhs),
        }
    }

    /// Rewrites an inequality into `lhs > rhs` form, using integer
    /// semantics (`a >= b` becomes `a + 1 > b`).
    pub fn to_gt(&self) -> Rel {
        debug_assert!(self.is_inequality());
        let (lhs, op, rhs) = match self.op {
            CmpOp::Lt => (self.rhs.clone(), CmpOp::Gt, self.lhs.clone()),
            CmpOp::Le => (self.rhs.clone(), CmpOp::Ge, self.lhs.clone()),
            _ => (self.lhs.clone(), self.op, self.rhs.clone()),
        };
        match op {
            CmpOp::Ge => Rel::gt(lhs + Expr::one(), rhs),
            _ => Rel::gt(lhs, rhs),
        }
    }

    /// Normal form `e > 0` for inequalities and `e == 0` for equalities.
    pub fn normalize(&self) -> Rel {
        if self.is_equality() {
            return Rel::eq(self.lhs.clone() - self.rhs.clone(), Expr::zero());
        }
        let gt = self.to_gt();
        Rel::gt(gt.lhs - gt.rhs, Expr::zero())
    }

    /// Moves every non-constant summand to the left and the numeric
    /// constant to the right, preserving the operator.
    pub fn split_variables_and_constants(&self) -> Rel {
        let diff = (self.lhs.clone() - self.rhs.clone()).expand();
        let mut constant = Expr::zero();
        let mut rest = Vec::new();
        let terms: Vec<Expr> = match diff {
            Expr::Add(ts) => ts,
            other => vec![other],
        };
        for t in terms {
            if matches!(t, Expr::Num(_)) {
                constant = constant + t;
            } else {
                rest.push(t);
            }
        }
        Rel::new(Expr::add(rest), self.op, -constant)
    }

    /// Integer negation of a `lhs <= rhs` atom: `-lhs <= -rhs - 1`.
    pub fn negate_le(&self) -> Rel {
        debug_assert_eq!(self.op, CmpOp::Le);
        Rel::le(-self.lhs.clone(), -self.rhs.clone() - Expr::one())
    }

    /// True when the atom holds for every assignment (constant difference
    /// satisfying the operator, or syntactically equal sides for `<=`,
    /// `>=`, `==`).
    pub fn is_trivially_true(&self) -> bool {
        let diff = (self.lhs.clone() - self.rhs.clone()).expand();
        if let Some(d) = diff.as_num() {
            return match self.op {
                CmpOp::Lt => d.is_negative(),
                CmpOp::Le => !d.is_positive(),
                CmpOp::Gt => d.is_positive(),
                CmpOp::Ge => !d.is_negative(),
                CmpOp::Eq => d.is_zero(),
            };
        }
        false
    }

    /// True when the atom fails for every assignment.
    pub fn is_trivially_false(&self) -> bool {
        let diff = (self.lhs.clone() - self.rhs.clone()).expand();
        if let Some(d) = diff.as_num() {
            return match self.op {
                CmpOp::Lt => !d.is_negative(),
                CmpOp::Le => d.is_positive(),
                CmpOp::Gt => !d.is_positive(),
                CmpOp::Ge => d.is_negative(),
                CmpOp::Eq => !d.is_zero(),
            };
        }
        false
    }

    pub fn is_linear(&self) -> bool {
        self.lhs.is_linear() && self.rhs.is_linear()
    }

    pub fn is_polynomial(&self) -> bool {
        self.lhs.is_polynomial() && self.rhs.is_polynomial()
    }

    pub fn subs(&self, map: &Subs) -> Rel {
        Rel::new(self.lhs.subs(map), self.op, self.rhs.subs(map))
    }

    pub fn collect_vars(&self, out: &mut IndexSet<VarId>) {
        self.lhs.collect_vars(out);
        self.rhs.collect_vars(out);
    }

    pub fn vars(&self) -> IndexSet<VarId> {
        let mut out = IndexSet::new();
        self.collect_vars(&mut out);
        out
    }

    pub fn has_var(&self, var: VarId) -> bool {
        self.lhs.has_var(var) || self.rhs.has_var(var)
    }

    pub fn has_var_where<F: Fn(VarId) -> bool + Copy>(&self, pred: F) -> bool {
        self.lhs.has_var_where(pred) || self.rhs.has_var_where(pred)
    }

    pub fn display<'a>(&'a self, vars: &'a VariableManager) -> RelDisplay<'a> {
        RelDisplay { rel: self, vars }
    }
}

pub struct RelDisplay<'a> {
    rel: &'a Rel,
    vars: &'a VariableManager,
}

impl fmt::Display for RelDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.rel.lhs.display(self.vars),
            self.rel.op,
            self.rel.rhs.display(self.vars)
        )
    }
}

/// Conjunction of guard atoms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Guard {
    pub atoms: Vec<Rel>,
}

impl Guard {
    pub fn trivial() -> Guard {
        Guard { atoms: Vec::new() }
    }

    pub fn single(atom: Rel) -> Guard {
        Guard { atoms: vec![atom] }
    }

    pub fn from_atoms(atoms: Vec<Rel>) -> Guard {
        Guard { atoms }
    }

    pub fn push(&mut self, atom: Rel) {
        self.atoms.push(atom);
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rel> {
        self.atoms.iter()
    }

    pub fn subs(&self, map: &Subs) -> Guard {
        Guard {
            atoms: self.atoms.iter().map(|a| a.subs(map)).collect(),
        }
    }

    pub fn collect_vars(&self, out: &mut IndexSet<VarId>) {
        for a in &self.atoms {
            a.collect_vars(out);
        }
    }

    pub fn vars(&self) -> IndexSet<VarId> {
        let mut out = IndexSet::new();
        self.collect_vars(&mut out);
        out
    }

    pub fn has_var_where<F: Fn(VarId) -> bool + Copy>(&self, pred: F) -> bool {
        self.atoms.iter().any(|a| a.has_var_where(pred))
    }

    pub fn display<'a>(&'a self, vars: &'a VariableManager) -> GuardDisplay<'a> {
        GuardDisplay { guard: self, vars }
    }
}

impl IntoIterator for Guard {
    type Item = Rel;
    type IntoIter = std::vec::IntoIter<Rel>;
    fn into_iter(self) -> Self::IntoIter {
        self.atoms.into_iter()
    }
}

impl<'a> IntoIterator for &'a Guard {
    type Item = &'a Rel;
    type IntoIter = std::slice::Iter<'a, Rel>;
    fn into_iter(self) -> Self::IntoIter {
        self.atoms.iter()
    }
}

pub struct GuardDisplay<'a> {
    guard: &'a Guard,
    vars: &'a VariableManager,
}

impl fmt::Display for GuardDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.guard.is_empty() {
            return write!(f, "TRUE");
        }
        for (i, a) in self.guard.iter().enumerate() {
            if i > 0 {
                write!(f, " && ")?;
            }
            write!(f, "{}", a.display(self.vars))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expr {
        Expr::var(0)
    }

    fn y() -> Expr {
        Expr::var(1)
    }

    #[test]
    fn to_le_uses_integer_semantics() {
        let r = Rel::lt(x(), y());
        let le = r.to_le();
        assert_eq!(le.op, CmpOp::Le);
        assert_eq!(le.lhs, x());
        assert_eq!(le.rhs, y() - Expr::one());
    }

    #[test]
    fn to_gt_uses_integer_semantics() {
        let r = Rel::ge(x(), Expr::zero());
        let gt = r.to_gt();
        assert_eq!(gt.op, CmpOp::Gt);
        assert_eq!(gt.lhs, x() + Expr::one());
        assert_eq!(gt.rhs, Expr::zero());
    }

    #[test]
    fn normalize_moves_everything_left() {
        let r = Rel::le(x(), y());
        let n = r.normalize();
        assert_eq!(n.op, CmpOp::Gt);
        assert_eq!(n.rhs, Expr::zero());
        // x <= y becomes y - x + 1 > 0
        assert_eq!(n.lhs, y() - x() + Expr::one());
    }

    #[test]
    fn split_separates_constant() {
        // x + 2 <= y + 5  ~>  x - y <= 3
        let r = Rel::le(x() + Expr::int(2), y() + Expr::int(5));
        let s = r.split_variables_and_constants();
        assert_eq!(s.op, CmpOp::Le);
        assert_eq!(s.lhs, x() - y());
        assert_eq!(s.rhs, Expr::int(3));
    }

    #[test]
    fn negate_le_is_integer_complement() {
        // not (x <= 3)  ==  -x <= -4
        let r = Rel::le(x(), Expr::int(3));
        let n = r.negate_le();
        assert_eq!(n, Rel::le(-x(), Expr::int(-4)));
    }

    #[test]
    fn triviality_checks() {
        assert!(Rel::ge(Expr::int(42), Expr::zero()).is_trivially_true());
        assert!(Rel::le(x(), x() + Expr::one()).is_trivially_true());
        assert!(Rel::eq(x(), x()).is_trivially_true());
        assert!(Rel::gt(Expr::zero(), Expr::one()).is_trivially_false());
        assert!(!Rel::gt(x(), Expr::zero()).is_trivially_true());
        assert!(!Rel::gt(x(), Expr::zero()).is_trivially_false());
    }

    #[test]
    fn guard_display_joins_atoms() {
        let mut vars = VariableManager::new();
        vars.intern("x");
        let g = Guard::from_atoms(vec![
            Rel::gt(x(), Expr::zero()),
            Rel::le(x(), Expr::int(10)),
        ]);
        assert_eq!(g.display(&vars).to_string(), "x > 0 && x <= 10");
        assert_eq!(Guard::trivial().display(&vars).to_string(), "TRUE");
    }
}
