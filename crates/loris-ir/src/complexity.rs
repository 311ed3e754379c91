use std::fmt;

/// Asymptotic complexity class, totally ordered.
///
/// `Unknown` is the bottom element: it compares below `Const` so that any
/// derived bound improves on it. `NestedExp` covers syntactic `n^n` growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Complexity {
    Unknown,
    /// O(1)
    Const,
    /// O(n^k)
    Poly(u32),
    /// O(2^n)
    Exp,
    /// O(n^n)
    NestedExp,
    /// Unbounded cost for bounded inputs.
    Infty,
}

impl Complexity {
    /// The larger of the two classes.
    pub fn max(self, other: Complexity) -> Complexity {
        if self >= other {
            self
        } else {
            other
        }
    }

    /// Complexity of a product of two costs.
    pub fn mul(self, other: Complexity) -> Complexity {
        use Complexity::*;
        match (self, other) {
            (Unknown, _) | (_, Unknown) => Unknown,
            (Infty, _) | (_, Infty) => Infty,
            (NestedExp, _) | (_, NestedExp) => NestedExp,
            (Exp, _) | (_, Exp) => Exp,
            (Poly(a), Poly(b)) => Poly(a + b),
            (Poly(a), Const) | (Const, Poly(a)) => Poly(a),
            (Const, Const) => Const,
        }
    }

    pub fn is_poly(self) -> bool {
        matches!(self, Complexity::Const | Complexity::Poly(_))
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Complexity::Unknown => write!(f, "Unknown"),
            Complexity::Const => write!(f, "O(1)"),
            Complexity::Poly(1) => write!(f, "O(n)"),
            Complexity::Poly(k) => write!(f, "O(n^{k})"),
            Complexity::Exp => write!(f, "O(2^n)"),
            Complexity::NestedExp => write!(f, "O(n^n)"),
            Complexity::Infty => write!(f, "INF"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_the_lattice() {
        use Complexity::*;
        assert!(Unknown < Const);
        assert!(Const < Poly(1));
        assert!(Poly(1) < Poly(2));
        assert!(Poly(100) < Exp);
        assert!(Exp < NestedExp);
        assert!(NestedExp < Infty);
    }

    #[test]
    fn max_picks_the_larger_class() {
        use Complexity::*;
        assert_eq!(Poly(2).max(Poly(3)), Poly(3));
        assert_eq!(Unknown.max(Const), Const);
        assert_eq!(Infty.max(Exp), Infty);
    }

    #[test]
    fn mul_adds_polynomial_degrees() {
        use Complexity::*;
        assert_eq!(Poly(1).mul(Poly(2)), Poly(3));
        assert_eq!(Const.mul(Poly(2)), Poly(2));
        assert_eq!(Exp.mul(Poly(2)), Exp);
        assert_eq!(Unknown.mul(Infty), Unknown);
    }

    #[test]
    fn display_is_stable() {
        use Complexity::*;
        assert_eq!(Const.to_string(), "O(1)");
        assert_eq!(Poly(1).to_string(), "O(n)");
        assert_eq!(Poly(3).to_string(), "O(n^3)");
        assert_eq!(Exp.to_string(), "O(2^n)");
        assert_eq!(Infty.to_string(), "INF");
    }
}
