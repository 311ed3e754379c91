use num::{BigInt, Integer, One, ToPrimitive};

use loris_ir::expr::Expr;
use loris_ir::rel::{CmpOp, Rel};
use loris_ir::variables::VariableManager;

use crate::terms::SmtTerm;

/// Maximum constant exponent that is unrolled into a product. Larger
/// powers make the solver degenerate, so they fall back to the policy.
const MAX_EXPONENT: u32 = 5;

/// How to encode powers the solver cannot express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowPolicy {
    /// Fail the encoding. Required for implication queries, where an
    /// over-approximation would be unsound.
    Reject,
    /// Replace the power by a fresh unconstrained variable. Fine for
    /// feasibility queries, which tolerate over-approximation.
    Approximate,
}

/// Translates IR expressions and guard atoms into solver terms.
pub struct Encoder<'a> {
    vars: &'a VariableManager,
    policy: PowPolicy,
    /// Fresh variables introduced for approximated powers.
    pub aux_vars: Vec<String>,
}

impl<'a> Encoder<'a> {
    pub fn new(vars: &'a VariableManager, policy: PowPolicy) -> Self {
        Encoder {
            vars,
            policy,
            aux_vars: Vec::new(),
        }
    }

    /// Encodes a guard atom. Rational coefficients are cleared by scaling
    /// both sides with the least common denominator, which preserves the
    /// atom over the integers.
    pub fn encode_rel(&mut self, rel: &Rel) -> Option<SmtTerm> {
        let diff = (rel.lhs.clone() - rel.rhs.clone()).expand();
        let scaled = clear_denominators(&diff);
        let lhs = self.encode_expr(&scaled)?;
        let zero = SmtTerm::int(0);
        Some(match rel.op {
            CmpOp::Lt => lhs.lt(zero),
            CmpOp::Le => lhs.le(zero),
            CmpOp::Gt => lhs.gt(zero),
            CmpOp::Ge => lhs.ge(zero),
            CmpOp::Eq => lhs.eq(zero),
        })
    }

    pub fn encode_expr(&mut self, e: &Expr) -> Option<SmtTerm> {
        match e {
            Expr::Infty => None,
            Expr::Num(n) => {
                if !n.is_integer() {
                    return None;
                }
                Some(SmtTerm::int(n.to_integer().to_i64()?))
            }
            Expr::Var(v) => Some(SmtTerm::var(self.vars.name(*v))),
            Expr::Add(terms) => {
                let mut out: Option<SmtTerm> = None;
                for t in terms {
                    let enc = self.encode_expr(t)?;
                    out = Some(match out {
                        None => enc,
                        Some(acc) => acc.add(enc),
                    });
                }
                out
            }
            Expr::Mul(factors) => {
                let mut out: Option<SmtTerm> = None;
                for t in factors {
                    let enc = self.encode_expr(t)?;
                    out = Some(match out {
                        None => enc,
                        Some(acc) => acc.mul(enc),
                    });
                }
                out
            }
            Expr::Pow(base, exp) => {
                if let Some(k) = exp.as_int().and_then(|k| k.to_u32()) {
                    if (1..=MAX_EXPONENT).contains(&k) {
                        let b = self.encode_expr(base)?;
                        let mut acc = b.clone();
                        for _ in 1..k {
                            acc = acc.mul(b.clone());
                        }
                        return Some(acc);
                    }
                }
                match self.policy {
                    PowPolicy::Reject => None,
                    PowPolicy::Approximate => Some(self.fresh_pow_var()),
                }
            }
        }
    }

    fn fresh_pow_var(&mut self) -> SmtTerm {
        let name = format!("pow!{}", self.aux_vars.len());
        self.aux_vars.push(name.clone());
        SmtTerm::var(name)
    }
}

/// Scales an expression by the least common denominator of its numeric
/// leaves, yielding an integral multiple with the same sign everywhere.
pub fn clear_denominators(e: &Expr) -> Expr {
    let denom = common_denominator(e);
    if denom.is_one() {
        return e.clone();
    }
    (e.clone() * Expr::num(num::BigRational::from_integer(denom))).expand()
}

/// Least common multiple of the denominators of every numeric leaf
/// outside power exponents.
fn common_denominator(e: &Expr) -> BigInt {
    match e {
        Expr::Num(n) => n.denom().clone(),
        Expr::Var(_) | Expr::Infty => BigInt::one(),
        Expr::Add(ts) | Expr::Mul(ts) => ts
            .iter()
            .fold(BigInt::one(), |acc, t| acc.lcm(&common_denominator(t))),
        Expr::Pow(_, _) => BigInt::one(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::smtlib_printer::to_smtlib;
    use loris_ir::expr::rational;

    fn setup() -> VariableManager {
        let mut vars = VariableManager::new();
        vars.intern("x");
        vars.intern("y");
        vars
    }

    #[test]
    fn linear_atom_encodes_as_difference_against_zero() {
        let vars = setup();
        let mut enc = Encoder::new(&vars, PowPolicy::Reject);
        let rel = Rel::gt(Expr::var(0), Expr::int(3));
        let term = enc.encode_rel(&rel).unwrap();
        assert_eq!(to_smtlib(&term), "(> (+ (- 3) x) 0)");
    }

    #[test]
    fn rational_coefficients_are_cleared() {
        let vars = setup();
        let mut enc = Encoder::new(&vars, PowPolicy::Reject);
        // x/2 >= 1  scales to  x - 2 >= 0
        let rel = Rel::ge(
            Expr::num(rational(1) / rational(2)) * Expr::var(0),
            Expr::one(),
        );
        let term = enc.encode_rel(&rel).unwrap();
        assert_eq!(to_smtlib(&term), "(>= (+ (- 2) x) 0)");
    }

    #[test]
    fn small_constant_powers_unroll() {
        let vars = setup();
        let mut enc = Encoder::new(&vars, PowPolicy::Reject);
        let e = Expr::pow(Expr::var(0), Expr::int(3));
        let term = enc.encode_expr(&e).unwrap();
        assert_eq!(to_smtlib(&term), "(* (* x x) x)");
    }

    #[test]
    fn symbolic_powers_respect_policy() {
        let vars = setup();
        let e = Expr::pow(Expr::int(2), Expr::var(0));

        let mut reject = Encoder::new(&vars, PowPolicy::Reject);
        assert!(reject.encode_expr(&e).is_none());

        let mut approx = Encoder::new(&vars, PowPolicy::Approximate);
        let term = approx.encode_expr(&e).unwrap();
        assert_eq!(term, SmtTerm::var("pow!0"));
        assert_eq!(approx.aux_vars, vec!["pow!0".to_string()]);
    }

    #[test]
    fn infinity_never_encodes() {
        let vars = setup();
        let mut enc = Encoder::new(&vars, PowPolicy::Approximate);
        assert!(enc.encode_expr(&Expr::Infty).is_none());
    }
}
