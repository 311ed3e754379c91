use indexmap::{IndexMap, IndexSet};
use num::{BigInt, BigRational, One, Signed, ToPrimitive, Zero};
use std::fmt;
use std::ops;

use crate::complexity::Complexity;
use crate::variables::{VarId, VariableManager};

/// Exact rational constant. Parsed input only contains integers, but
/// recurrence closed forms (e.g. `n*(n+1)/2`) need rational coefficients.
pub type Numeric = BigRational;

/// Substitution map, applied simultaneously.
pub type Subs = IndexMap<VarId, Expr>;

/// A normalized symbolic expression.
///
/// Invariants maintained by the smart constructors: sums and products are
/// flattened, constants are folded, like terms and equal-base powers are
/// collected, and operand lists are sorted into a canonical order. `Infty`
/// absorbs every operation it appears in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expr {
    Num(Numeric),
    Var(VarId),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Infty,
}

pub fn rational(n: i64) -> Numeric {
    BigRational::from_integer(BigInt::from(n))
}

impl Expr {
    pub fn int(n: i64) -> Expr {
        Expr::Num(rational(n))
    }

    pub fn num(n: Numeric) -> Expr {
        Expr::Num(n)
    }

    pub fn var(id: VarId) -> Expr {
        Expr::Var(id)
    }

    pub fn zero() -> Expr {
        Expr::int(0)
    }

    pub fn one() -> Expr {
        Expr::int(1)
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Num(n) if n.is_zero())
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Expr::Num(n) if n.is_one())
    }

    pub fn is_infty(&self) -> bool {
        matches!(self, Expr::Infty)
    }

    pub fn as_num(&self) -> Option<&Numeric> {
        match self {
            Expr::Num(n) => Some(n),
            _ => None,
        }
    }

    /// The value as an integer, if this is an integral constant.
    pub fn as_int(&self) -> Option<BigInt> {
        match self {
            Expr::Num(n) if n.is_integer() => Some(n.to_integer()),
            _ => None,
        }
    }

    /// Flattening, constant-folding sum constructor.
    pub fn add(terms: Vec<Expr>) -> Expr {
        let mut constant = Numeric::zero();
        let mut collected: IndexMap<Expr, Numeric> = IndexMap::new();
        let mut stack: Vec<Expr> = terms;
        stack.reverse();
        while let Some(t) = stack.pop() {
            match t {
                Expr::Infty => return Expr::Infty,
                Expr::Num(n) => constant += n,
                Expr::Add(inner) => {
                    for e in inner.into_iter().rev() {
                        stack.push(e);
                    }
                }
                other => {
                    let (coeff, body) = split_coeff(other);
                    *collected.entry(body).or_insert_with(Numeric::zero) += coeff;
                }
            }
        }
        let mut out: Vec<Expr> = Vec::new();
        let mut keys: Vec<Expr> = collected.keys().cloned().collect();
        keys.sort();
        for key in keys {
            let coeff = collected.swap_remove(&key).unwrap();
            if coeff.is_zero() {
                continue;
            }
            if coeff.is_one() {
                out.push(key);
            } else {
                out.push(Expr::mul(vec![Expr::Num(coeff), key]));
            }
        }
        if !constant.is_zero() || out.is_empty() {
            out.push(Expr::Num(constant));
        }
        if out.len() == 1 {
            out.pop().unwrap()
        } else {
            out.sort();
            Expr::Add(out)
        }
    }

    /// Flattening, constant-folding product constructor. Powers with equal
    /// bases are merged by summing exponents.
    pub fn mul(factors: Vec<Expr>) -> Expr {
        let mut coeff = Numeric::one();
        let mut powers: IndexMap<Expr, Vec<Expr>> = IndexMap::new();
        let mut infty = false;
        let mut stack: Vec<Expr> = factors;
        stack.reverse();
        while let Some(f) = stack.pop() {
            match f {
                Expr::Infty => infty = true,
                Expr::Num(n) => coeff *= n,
                Expr::Mul(inner) => {
                    for e in inner.into_iter().rev() {
                        stack.push(e);
                    }
                }
                Expr::Pow(base, exp) => {
                    powers.entry(*base).or_default().push(*exp);
                }
                other => {
                    powers.entry(other).or_default().push(Expr::one());
                }
            }
        }
        if infty {
            // 0 * INF stays 0; anything else is absorbed.
            if coeff.is_zero() {
                return Expr::zero();
            }
            return Expr::Infty;
        }
        if coeff.is_zero() {
            return Expr::zero();
        }
        let mut out: Vec<Expr> = Vec::new();
        let mut bases: Vec<Expr> = powers.keys().cloned().collect();
        bases.sort();
        for base in bases {
            let exps = powers.swap_remove(&base).unwrap();
            let exp = Expr::add(exps);
            let p = Expr::pow(base, exp);
            match p {
                Expr::Num(n) => coeff *= n,
                other if other.is_one() => {}
                other => out.push(other),
            }
        }
        if out.is_empty() {
            return Expr::Num(coeff);
        }
        if !coeff.is_one() {
            out.push(Expr::Num(coeff));
        }
        if out.len() == 1 {
            out.pop().unwrap()
        } else {
            out.sort();
            Expr::Mul(out)
        }
    }

    /// Power constructor; folds constant bases/exponents where exact.
    pub fn pow(base: Expr, exp: Expr) -> Expr {
        if exp.is_zero() {
            return Expr::one();
        }
        if exp.is_one() {
            return base;
        }
        if base.is_infty() || exp.is_infty() {
            return Expr::Infty;
        }
        if base.is_zero() || base.is_one() {
            return base;
        }
        if let (Expr::Num(b), Some(k)) = (&base, exp.as_int()) {
            if let Some(k) = k.to_i32() {
                if k.unsigned_abs() <= 64 {
                    let p = b.pow(k);
                    return Expr::Num(p);
                }
            }
        }
        match base {
            Expr::Pow(inner_base, inner_exp) => {
                let merged = Expr::mul(vec![*inner_exp, exp]);
                Expr::pow(*inner_base, merged)
            }
            other => Expr::Pow(Box::new(other), Box::new(exp)),
        }
    }

    /// Collects every variable occurring in the expression.
    pub fn collect_vars(&self, out: &mut IndexSet<VarId>) {
        match self {
            Expr::Num(_) | Expr::Infty => {}
            Expr::Var(v) => {
                out.insert(*v);
            }
            Expr::Add(terms) | Expr::Mul(terms) => {
                for t in terms {
                    t.collect_vars(out);
                }
            }
            Expr::Pow(b, e) => {
                b.collect_vars(out);
                e.collect_vars(out);
            }
        }
    }

    pub fn vars(&self) -> IndexSet<VarId> {
        let mut out = IndexSet::new();
        self.collect_vars(&mut out);
        out
    }

    pub fn has_var(&self, var: VarId) -> bool {
        self.has_var_where(|v| v == var)
    }

    pub fn has_var_where<F: Fn(VarId) -> bool + Copy>(&self, pred: F) -> bool {
        match self {
            Expr::Num(_) | Expr::Infty => false,
            Expr::Var(v) => pred(*v),
            Expr::Add(terms) | Expr::Mul(terms) => terms.iter().any(|t| t.has_var_where(pred)),
            Expr::Pow(b, e) => b.has_var_where(pred) || e.has_var_where(pred),
        }
    }

    /// Applies a simultaneous substitution.
    pub fn subs(&self, map: &Subs) -> Expr {
        if map.is_empty() {
            return self.clone();
        }
        match self {
            Expr::Num(_) | Expr::Infty => self.clone(),
            Expr::Var(v) => map.get(v).cloned().unwrap_or_else(|| self.clone()),
            Expr::Add(terms) => Expr::add(terms.iter().map(|t| t.subs(map)).collect()),
            Expr::Mul(terms) => Expr::mul(terms.iter().map(|t| t.subs(map)).collect()),
            Expr::Pow(b, e) => Expr::pow(b.subs(map), e.subs(map)),
        }
    }

    pub fn subs_var(&self, var: VarId, to: &Expr) -> Expr {
        let mut map = Subs::new();
        map.insert(var, to.clone());
        self.subs(&map)
    }

    /// Distributes products over sums and unrolls small constant-exponent
    /// powers of sums, yielding a canonical polynomial form where possible.
    pub fn expand(&self) -> Expr {
        match self {
            Expr::Num(_) | Expr::Var(_) | Expr::Infty => self.clone(),
            Expr::Pow(b, e) => {
                let base = b.expand();
                let exp = e.expand();
                if let (Expr::Add(_), Some(k)) = (&base, exp.as_int()) {
                    if let Some(k) = k.to_u32() {
                        if (2..=8).contains(&k) {
                            let mut acc = base.clone();
                            for _ in 1..k {
                                acc = distribute(acc, base.clone());
                            }
                            return acc;
                        }
                    }
                }
                Expr::pow(base, exp)
            }
            Expr::Add(terms) => Expr::add(terms.iter().map(|t| t.expand()).collect()),
            Expr::Mul(factors) => {
                let mut acc = Expr::one();
                for f in factors {
                    acc = distribute(acc, f.expand());
                }
                acc
            }
        }
    }

    /// True when the expanded form is a polynomial (no variable occurs in a
    /// power exponent, no `Infty`).
    pub fn is_polynomial(&self) -> bool {
        match self {
            Expr::Num(_) | Expr::Var(_) => true,
            Expr::Infty => false,
            Expr::Add(terms) | Expr::Mul(terms) => terms.iter().all(|t| t.is_polynomial()),
            Expr::Pow(b, e) => {
                b.is_polynomial() && e.as_int().and_then(|k| k.to_u32()).is_some()
            }
        }
    }

    /// Degree ≤ 1 in every variable, jointly (no products of variables).
    pub fn is_linear(&self) -> bool {
        let expanded = self.expand();
        let terms: Vec<&Expr> = match &expanded {
            Expr::Add(ts) => ts.iter().collect(),
            other => vec![other],
        };
        terms.iter().all(|t| term_total_degree(t).is_some_and(|d| d <= 1))
    }

    /// The total degree of the expanded polynomial form, or `None` if the
    /// expression is not polynomial.
    pub fn total_degree(&self) -> Option<u32> {
        let expanded = self.expand();
        let terms: Vec<&Expr> = match &expanded {
            Expr::Add(ts) => ts.iter().collect(),
            other => vec![other],
        };
        let mut max = 0;
        for t in terms {
            max = max.max(term_total_degree(t)?);
        }
        Some(max)
    }

    /// The highest power of `var` in the expanded form, or `None` when
    /// `var` occurs non-polynomially (e.g. inside an exponent).
    pub fn degree(&self, var: VarId) -> Option<u32> {
        self.poly_coeffs(var).map(|cs| cs.len().saturating_sub(1) as u32)
    }

    /// Coefficients of `var^0, var^1, ...` in the expanded form. `None` when
    /// `var` occurs inside a power exponent or under a symbolic power.
    pub fn poly_coeffs(&self, var: VarId) -> Option<Vec<Expr>> {
        let expanded = self.expand();
        let terms: Vec<Expr> = match expanded {
            Expr::Add(ts) => ts,
            other => vec![other],
        };
        let mut coeffs: Vec<Vec<Expr>> = Vec::new();
        for t in terms {
            let (power, rest) = strip_var_power(t, var)?;
            let idx = power as usize;
            if coeffs.len() <= idx {
                coeffs.resize_with(idx + 1, Vec::new);
            }
            coeffs[idx].push(rest);
        }
        if coeffs.is_empty() {
            coeffs.push(vec![Expr::zero()]);
        }
        Some(coeffs.into_iter().map(Expr::add).collect())
    }

    /// Linear decomposition `(coeff per var, constant)` of the expanded
    /// form; `None` when the expression is not linear.
    pub fn lin_coeffs(&self) -> Option<(IndexMap<VarId, Numeric>, Numeric)> {
        let expanded = self.expand();
        let terms: Vec<&Expr> = match &expanded {
            Expr::Add(ts) => ts.iter().collect(),
            other => vec![other],
        };
        let mut coeffs: IndexMap<VarId, Numeric> = IndexMap::new();
        let mut constant = Numeric::zero();
        for t in terms {
            match t {
                Expr::Num(n) => constant += n.clone(),
                Expr::Var(v) => {
                    *coeffs.entry(*v).or_insert_with(Numeric::zero) += Numeric::one()
                }
                Expr::Mul(fs) => {
                    let mut num: Option<Numeric> = None;
                    let mut var: Option<VarId> = None;
                    for f in fs {
                        match f {
                            Expr::Num(n) => num = Some(n.clone()),
                            Expr::Var(v) if var.is_none() => var = Some(*v),
                            _ => return None,
                        }
                    }
                    let v = var?;
                    *coeffs.entry(v).or_insert_with(Numeric::zero) +=
                        num.unwrap_or_else(Numeric::one);
                }
                _ => return None,
            }
        }
        Some((coeffs, constant))
    }

    /// Syntactic complexity: a sound upper bound on asymptotic growth over
    /// the variable universe.
    pub fn complexity(&self) -> Complexity {
        match self {
            Expr::Infty => Complexity::Infty,
            Expr::Num(_) => Complexity::Const,
            Expr::Var(_) => Complexity::Poly(1),
            Expr::Add(terms) => terms
                .iter()
                .map(|t| t.complexity())
                .fold(Complexity::Const, Complexity::max),
            Expr::Mul(factors) => factors
                .iter()
                .map(|f| f.complexity())
                .fold(Complexity::Const, Complexity::mul),
            Expr::Pow(base, exp) => {
                if let Some(k) = exp.as_int().and_then(|k| k.to_u32()) {
                    // Constant exponent: polynomial iterated product.
                    let mut acc = Complexity::Const;
                    for _ in 0..k {
                        acc = acc.mul(base.complexity());
                    }
                    return acc;
                }
                if exp.has_var_where(|_| true) {
                    if base.has_var_where(|_| true) {
                        Complexity::NestedExp
                    } else {
                        match base.as_num() {
                            Some(b) if b.abs() <= Numeric::one() => Complexity::Const,
                            _ => Complexity::Exp,
                        }
                    }
                } else {
                    Complexity::Const
                }
            }
        }
    }

    /// Renders the expression with variable names from `vars`.
    pub fn display<'a>(&'a self, vars: &'a VariableManager) -> ExprDisplay<'a> {
        ExprDisplay { expr: self, vars }
    }
}

/// Splits a multiplicative numeric coefficient off a term.
fn split_coeff(e: Expr) -> (Numeric, Expr) {
    if let Expr::Mul(factors) = &e {
        let mut num = Numeric::one();
        let mut rest = Vec::new();
        for f in factors {
            if let Expr::Num(n) = f {
                num *= n.clone();
            } else {
                rest.push(f.clone());
            }
        }
        if !num.is_one() {
            return (num, Expr::mul(rest));
        }
    }
    (Numeric::one(), e)
}

/// Multiplies two expanded expressions, distributing over sums.
fn distribute(a: Expr, b: Expr) -> Expr {
    let a_terms: Vec<Expr> = match a {
        Expr::Add(ts) => ts,
        other => vec![other],
    };
    let b_terms: Vec<Expr> = match b {
        Expr::Add(ts) => ts,
        other => vec![other],
    };
    let mut out = Vec::with_capacity(a_terms.len() * b_terms.len());
    for x in &a_terms {
        for y in &b_terms {
            out.push(Expr::mul(vec![x.clone(), y.clone()]));
        }
    }
    Expr::add(out)
}

/// Total degree of a single expanded term; `None` if non-polynomial.
fn term_total_degree(t: &Expr) -> Option<u32> {
    match t {
        Expr::Num(_) => Some(0),
        Expr::Var(_) => Some(1),
        Expr::Infty => None,
        Expr::Pow(b, e) => {
            let k = e.as_int()?.to_u32()?;
            Some(term_total_degree(b)? * k)
        }
        Expr::Mul(fs) => {
            let mut d = 0;
            for f in fs {
                d += term_total_degree(f)?;
            }
            Some(d)
        }
        Expr::Add(_) => None, // terms of an expanded sum are not sums
    }
}

/// Splits `var^k` out of a single expanded term, returning `(k, rest)`.
fn strip_var_power(t: Expr, var: VarId) -> Option<(u32, Expr)> {
    match t {
        Expr::Var(v) if v == var => Some((1, Expr::one())),
        Expr::Pow(b, e) => {
            if let Expr::Var(v) = b.as_ref() {
                if *v == var {
                    return e.as_int()?.to_u32().map(|k| (k, Expr::one()));
                }
            }
            let p = Expr::Pow(b, e);
            if p.has_var(var) {
                None
            } else {
                Some((0, p))
            }
        }
        Expr::Mul(fs) => {
            let mut power = 0;
            let mut rest = Vec::new();
            for f in fs {
                let (k, r) = strip_var_power(f, var)?;
                power += k;
                if !r.is_one() {
                    rest.push(r);
                }
            }
            Some((power, Expr::mul(rest)))
        }
        other => {
            if other.has_var(var) {
                None
            } else {
                Some((0, other))
            }
        }
    }
}

impl ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::add(vec![self, rhs])
    }
}

impl ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::add(vec![self, Expr::mul(vec![Expr::int(-1), rhs])])
    }
}

impl ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::mul(vec![self, rhs])
    }
}

impl ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::mul(vec![Expr::int(-1), self])
    }
}

pub struct ExprDisplay<'a> {
    expr: &'a Expr,
    vars: &'a VariableManager,
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, self.expr, self.vars, 0)
    }
}

fn write_num(f: &mut fmt::Formatter<'_>, n: &Numeric) -> fmt::Result {
    if n.is_integer() {
        write!(f, "{}", n.to_integer())
    } else {
        write!(f, "{}/{}", n.numer(), n.denom())
    }
}

// prec: 0 sum context, 1 product context, 2 power/atom context
fn write_expr(
    f: &mut fmt::Formatter<'_>,
    e: &Expr,
    vars: &VariableManager,
    prec: u8,
) -> fmt::Result {
    match e {
        Expr::Infty => write!(f, "INF"),
        Expr::Var(v) => write!(f, "{}", vars.name(*v)),
        Expr::Num(n) => {
            if (n.is_negative() || !n.is_integer()) && prec > 0 {
                write!(f, "(")?;
                write_num(f, n)?;
                write!(f, ")")
            } else {
                write_num(f, n)
            }
        }
        Expr::Add(terms) => {
            if prec > 0 {
                write!(f, "(")?;
            }
            for (i, t) in terms.iter().enumerate() {
                if i > 0 {
                    write!(f, " + ")?;
                }
                write_expr(f, t, vars, 0)?;
            }
            if prec > 0 {
                write!(f, ")")?;
            }
            Ok(())
        }
        Expr::Mul(factors) => {
            if prec > 1 {
                write!(f, "(")?;
            }
            for (i, t) in factors.iter().enumerate() {
                if i > 0 {
                    write!(f, "*")?;
                }
                write_expr(f, t, vars, 1)?;
            }
            if prec > 1 {
                write!(f, ")")?;
            }
            Ok(())
        }
        Expr::Pow(b, e) => {
            write_expr(f, b, vars, 2)?;
            write!(f, "^")?;
            match e.as_ref() {
                Expr::Num(n) if n.is_integer() && !n.is_negative() => write_num(f, n),
                inner => {
                    write!(f, "(")?;
                    write_expr(f, inner, vars, 0)?;
                    write!(f, ")")
                }
            }
        }
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
    fn constants_fold_in_sums_and_products() {
        assert_eq!(Expr::int(2) + Expr::int(3), Expr::int(5));
        assert_eq!(Expr::int(2) * Expr::int(3), Expr::int(6));
        assert_eq!(Expr::int(4) - Expr::int(4), Expr::zero());
    }

    #[test]
    fn like_terms_are_collected() {
        let e = x() + x() + x();
        assert_eq!(e, Expr::mul(vec![Expr::int(3), x()]));
        let e = x() + y() - x();
        assert_eq!(e, y());
    }

    #[test]
    fn equal_base_powers_merge() {
        let e = x() * x();
        assert_eq!(e, Expr::pow(x(), Expr::int(2)));
        let e = Expr::pow(x(), Expr::int(2)) * x();
        assert_eq!(e, Expr::pow(x(), Expr::int(3)));
    }

    #[test]
    fn symbolic_exponents_cancel_through_merging() {
        // 2^x * 2^(1-x) == 2
        let e = Expr::pow(Expr::int(2), x()) * Expr::pow(Expr::int(2), Expr::one() - x());
        assert_eq!(e, Expr::int(2));
    }

    #[test]
    fn pow_folding() {
        assert_eq!(Expr::pow(x(), Expr::zero()), Expr::one());
        assert_eq!(Expr::pow(x(), Expr::one()), x());
        assert_eq!(Expr::pow(Expr::int(2), Expr::int(10)), Expr::int(1024));
        assert_eq!(Expr::pow(Expr::zero(), x()), Expr::zero());
    }

    #[test]
    fn infty_absorbs() {
        assert_eq!(x() + Expr::Infty, Expr::Infty);
        assert_eq!(x() * Expr::Infty, Expr::Infty);
        assert_eq!(Expr::zero() * Expr::Infty, Expr::zero());
    }

    #[test]
    fn substitution_renormalizes() {
        // (x + 1) with x -> y - 1 gives y
        let e = x() + Expr::one();
        assert_eq!(e.subs_var(0, &(y() - Expr::one())), y());
    }

    #[test]
    fn expansion_distributes() {
        // (x + 1)*(x - 1) == x^2 - 1
        let e = (x() + Expr::one()) * (x() - Expr::one());
        let expanded = e.expand();
        assert_eq!(
            expanded,
            Expr::pow(x(), Expr::int(2)) - Expr::one()
        );
    }

    #[test]
    fn expansion_unrolls_small_powers_of_sums() {
        let e = Expr::pow(x() + Expr::one(), Expr::int(2)).expand();
        let expected = Expr::pow(x(), Expr::int(2)) + Expr::mul(vec![Expr::int(2), x()]) + Expr::one();
        assert_eq!(e, expected);
    }

    #[test]
    fn linearity() {
        assert!((x() + y() + Expr::int(7)).is_linear());
        assert!((Expr::int(3) * x()).is_linear());
        assert!(!(x() * y()).is_linear());
        assert!(!Expr::pow(x(), Expr::int(2)).is_linear());
    }

    #[test]
    fn degrees_and_coefficients() {
        // 3x^2 + xy + 5
        let e = Expr::mul(vec![Expr::int(3), Expr::pow(x(), Expr::int(2))])
            + x() * y()
            + Expr::int(5);
        assert_eq!(e.degree(0), Some(2));
        assert_eq!(e.degree(1), Some(1));
        assert_eq!(e.total_degree(), Some(2));
        let coeffs = e.poly_coeffs(0).unwrap();
        assert_eq!(coeffs.len(), 3);
        assert_eq!(coeffs[0], Expr::int(5));
        assert_eq!(coeffs[1], y());
        assert_eq!(coeffs[2], Expr::int(3));
    }

    #[test]
    fn degree_refuses_exponent_occurrences() {
        let e = Expr::pow(Expr::int(2), x());
        assert_eq!(e.degree(0), None);
        assert!(!e.is_polynomial());
    }

    #[test]
    fn lin_coeffs_decomposition() {
        // 2x - y + 3
        let e = Expr::int(2) * x() - y() + Expr::int(3);
        let (coeffs, constant) = e.lin_coeffs().unwrap();
        assert_eq!(coeffs.get(&0), Some(&rational(2)));
        assert_eq!(coeffs.get(&1), Some(&rational(-1)));
        assert_eq!(constant, rational(3));
        assert!((x() * y()).lin_coeffs().is_none());
    }

    #[test]
    fn syntactic_complexity() {
        assert_eq!(Expr::int(5).complexity(), Complexity::Const);
        assert_eq!(x().complexity(), Complexity::Poly(1));
        assert_eq!((x() * y()).complexity(), Complexity::Poly(2));
        assert_eq!(
            Expr::pow(x(), Expr::int(3)).complexity(),
            Complexity::Poly(3)
        );
        assert_eq!(Expr::pow(Expr::int(2), x()).complexity(), Complexity::Exp);
        assert_eq!(Expr::pow(x(), y()).complexity(), Complexity::NestedExp);
        assert_eq!((x() + Expr::Infty).complexity(), Complexity::Infty);
    }

    #[test]
    fn display_uses_variable_names() {
        let mut vars = VariableManager::new();
        vars.intern("x");
        vars.intern("y");
        let e = Expr::int(2) * x() + Expr::pow(y(), Expr::int(2));
        assert_eq!(e.display(&vars).to_string(), "2*x + y^2");
    }

    #[test]
    fn canonical_order_makes_equal_polynomials_structurally_equal() {
        let a = x() * y() + Expr::one();
        let b = y() * x() + Expr::one();
        assert_eq!(a, b);
        let a = (x() + y()).expand();
        let b = (y() + x()).expand();
        assert_eq!(a, b);
    }
}
