// ParseError carries diagnostic spans and source fragments; boxing would
// complicate call sites throughout the crate for little gain.
#![allow(clippy::result_large_err)]

use num::BigInt;
use pest::Parser;
use pest_derive::Parser;

use loris_ir::rel::CmpOp;

use crate::ast::*;
use crate::errors::ParseError;

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct KoatParser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;

fn span_from(pair: &Pair<'_>) -> Span {
    let s = pair.as_span();
    Span::new(s.start(), s.end())
}

fn named_source(source: &str, filename: &str) -> miette::NamedSource<String> {
    miette::NamedSource::new(filename, source.to_string())
}

/// Parse KoAT source text into a [`KoatFile`].
///
/// # Parameters
/// - `source`: UTF-8 problem text.
/// - `filename`: Logical filename used in diagnostics.
pub fn parse(source: &str, filename: &str) -> Result<KoatFile, ParseError> {
    let pairs = KoatParser::parse(Rule::file, source).map_err(|e| {
        let (start, end) = match e.location {
            pest::error::InputLocation::Pos(p) => (p, p + 1),
            pest::error::InputLocation::Span((s, e)) => (s, e),
        };
        ParseError::Syntax {
            message: format!("{e}"),
            span: Span::new(start, end).into(),
            src: named_source(source, filename),
        }
    })?;

    let file_pair = pairs.into_iter().next().ok_or(ParseError::NoRules)?;

    let mut goal = String::new();
    let mut start = StartTerm::ConstructorBased;
    let mut vars = Vec::new();
    let mut rules = Vec::new();

    for decl in file_pair.into_inner() {
        match decl.as_rule() {
            Rule::goal_decl => {
                let ident = decl.into_inner().next().expect("goal ident");
                goal = ident.as_str().to_string();
            }
            Rule::start_decl => {
                let spec = decl.into_inner().next().expect("start spec");
                let inner = spec.into_inner().next().expect("start spec body");
                start = match inner.as_rule() {
                    Rule::constructor_based => StartTerm::ConstructorBased,
                    Rule::fun_symbols => {
                        let ident = inner.into_inner().next().expect("start symbol");
                        StartTerm::Symbol(ident.as_str().to_string())
                    }
                    _ => unreachable!("grammar: start_spec"),
                };
            }
            Rule::var_decl => {
                for ident in decl.into_inner() {
                    vars.push(ident.as_str().to_string());
                }
            }
            Rule::rules_decl => {
                for rule_pair in decl.into_inner() {
                    rules.push(parse_rule(rule_pair));
                }
            }
            Rule::EOI => {}
            _ => unreachable!("grammar: file"),
        }
    }

    if rules.is_empty() {
        return Err(ParseError::NoRules);
    }
    Ok(KoatFile {
        goal,
        start,
        vars,
        rules,
    })
}

fn parse_rule(pair: Pair<'_>) -> KoatRule {
    let span = span_from(&pair);
    let mut lhs = None;
    let mut cost = None;
    let mut rhs = Vec::new();
    let mut guard = Vec::new();

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::term => lhs = Some(parse_term(part)),
            Rule::plain_arrow => {}
            Rule::cost_arrow => {
                let expr = part.into_inner().next().expect("cost expr");
                cost = Some(parse_expr(expr));
            }
            Rule::rule_rhs => {
                let inner = part.into_inner().next().expect("rule rhs body");
                match inner.as_rule() {
                    Rule::term => rhs.push(parse_term(inner)),
                    Rule::com_term => {
                        for child in inner.into_inner() {
                            if child.as_rule() == Rule::term {
                                rhs.push(parse_term(child));
                            }
                        }
                    }
                    _ => unreachable!("grammar: rule_rhs"),
                }
            }
            Rule::guard => {
                let body = part.into_inner().next().expect("guard body");
                for list in body.into_inner() {
                    if list.as_rule() == Rule::cond_list {
                        for cond in list.into_inner() {
                            guard.push(parse_cond(cond));
                        }
                    }
                }
            }
            _ => unreachable!("grammar: rule"),
        }
    }

    KoatRule {
        lhs: lhs.expect("rule lhs"),
        cost,
        rhs,
        guard,
        span,
    }
}

fn parse_term(pair: Pair<'_>) -> FunApp {
    let span = span_from(&pair);
    let mut inner = pair.into_inner();
    let name = inner.next().expect("term name").as_str().to_string();
    let mut args = Vec::new();
    if let Some(list) = inner.next() {
        for expr in list.into_inner() {
            args.push(parse_expr(expr));
        }
    }
    FunApp { name, args, span }
}

fn parse_cond(pair: Pair<'_>) -> Cond {
    let inner = pair.into_inner().next().expect("cond body");
    match inner.as_rule() {
        Rule::true_lit => Cond::True,
        Rule::cmp_cond => {
            let span = span_from(&inner);
            let mut parts = inner.into_inner();
            let lhs = parse_expr(parts.next().expect("cond lhs"));
            let op = match parts.next().expect("cond op").as_str() {
                ">=" => CmpOp::Ge,
                "<=" => CmpOp::Le,
                "==" | "=" => CmpOp::Eq,
                ">" => CmpOp::Gt,
                "<" => CmpOp::Lt,
                other => unreachable!("grammar: cmp_op {other}"),
            };
            let rhs = parse_expr(parts.next().expect("cond rhs"));
            Cond::Cmp { lhs, op, rhs, span }
        }
        _ => unreachable!("grammar: cond"),
    }
}

fn parse_expr(pair: Pair<'_>) -> PExpr {
    debug_assert_eq!(pair.as_rule(), Rule::expr);
    let mut negate_first = false;
    let mut acc: Option<PExpr> = None;
    let mut pending_op: Option<&str> = None;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::sign => negate_first = part.as_str() == "-",
            Rule::add_op => pending_op = Some(if part.as_str() == "+" { "+" } else { "-" }),
            Rule::product => {
                let mut value = parse_product(part);
                match acc.take() {
                    None => {
                        if negate_first {
                            value = PExpr::Neg(Box::new(value));
                        }
                        acc = Some(value);
                    }
                    Some(prev) => {
                        acc = Some(match pending_op.take() {
                            Some("-") => PExpr::Sub(Box::new(prev), Box::new(value)),
                            _ => PExpr::Add(Box::new(prev), Box::new(value)),
                        });
                    }
                }
            }
            _ => unreachable!("grammar: expr"),
        }
    }
    acc.expect("non-empty expr")
}

fn parse_product(pair: Pair<'_>) -> PExpr {
    let mut acc: Option<PExpr> = None;
    let mut pending: Option<(char, Span)> = None;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::mul_op => {
                let op = if part.as_str() == "/" { '/' } else { '*' };
                pending = Some((op, span_from(&part)));
            }
            Rule::factor => {
                let value = parse_factor(part);
                acc = Some(match acc.take() {
                    None => value,
                    Some(prev) => match pending.take() {
                        Some(('/', span)) => {
                            PExpr::Div(Box::new(prev), Box::new(value), span)
                        }
                        _ => PExpr::Mul(Box::new(prev), Box::new(value)),
                    },
                });
            }
            _ => unreachable!("grammar: product"),
        }
    }
    acc.expect("non-empty product")
}

fn parse_factor(pair: Pair<'_>) -> PExpr {
    let mut inner = pair.into_inner();
    let base = parse_base(inner.next().expect("factor base"));
    match inner.next() {
        None => base,
        Some(exp) => PExpr::Pow(Box::new(base), Box::new(parse_factor(exp))),
    }
}

fn parse_base(pair: Pair<'_>) -> PExpr {
    let inner = pair.into_inner().next().expect("base body");
    match inner.as_rule() {
        Rule::number => {
            let n = BigInt::parse_bytes(inner.as_str().as_bytes(), 10).expect("digits");
            PExpr::Num(n)
        }
        Rule::ident => PExpr::Var(inner.as_str().to_string(), span_from(&inner)),
        Rule::paren_expr => parse_expr(inner.into_inner().next().expect("paren expr")),
        _ => unreachable!("grammar: base"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_COUNTER: &str = r#"
(GOAL COMPLEXITY)
(STARTTERM (FUNCTIONSYMBOLS l0))
(VAR x)
(RULES
  l0(x) -> l0(x - 1) [ x > 0 ]
)
"#;

    #[test]
    fn parses_a_minimal_problem() {
        let file = parse(SINGLE_COUNTER, "test.koat").unwrap();
        assert_eq!(file.goal, "COMPLEXITY");
        assert!(matches!(&file.start, StartTerm::Symbol(s) if s == "l0"));
        assert_eq!(file.vars, vec!["x"]);
        assert_eq!(file.rules.len(), 1);
        let rule = &file.rules[0];
        assert_eq!(rule.lhs.name, "l0");
        assert_eq!(rule.rhs.len(), 1);
        assert!(rule.cost.is_none());
        assert_eq!(rule.guard.len(), 1);
    }

    #[test]
    fn parses_cost_annotations_and_com_wrappers() {
        let src = r#"
(GOAL COMPLEXITY)
(STARTTERM (FUNCTIONSYMBOLS f))
(VAR x y)
(RULES
  f(x, y) -{ x + y }> Com_1(g(x, y)) :|: x >= 0 && y >= 0
  g(x, y) -> Com_2(f(x - 1, y), f(x, y - 1)) [ TRUE ]
)
"#;
        let file = parse(src, "test.koat").unwrap();
        assert_eq!(file.rules.len(), 2);
        assert!(file.rules[0].cost.is_some());
        assert_eq!(file.rules[0].guard.len(), 2);
        assert_eq!(file.rules[1].rhs.len(), 2);
        assert!(matches!(file.rules[1].guard[0], Cond::True));
    }

    #[test]
    fn parses_constructor_based_start() {
        let src = r#"
(GOAL COMPLEXITY)
(STARTTERM CONSTRUCTOR-BASED)
(VAR x)
(RULES
  start(x) -> stop(x)
)
"#;
        let file = parse(src, "test.koat").unwrap();
        assert!(matches!(file.start, StartTerm::ConstructorBased));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let src = r#"
(GOAL COMPLEXITY)
# a comment
(STARTTERM (FUNCTIONSYMBOLS l0))
(VAR x)

(RULES
  # rules below
  l0(x) -> l0(x - 1) [ x > 0 ]
)
"#;
        assert!(parse(src, "test.koat").is_ok());
    }

    #[test]
    fn missing_rules_is_an_error() {
        let src = r#"
(GOAL COMPLEXITY)
(STARTTERM (FUNCTIONSYMBOLS l0))
(VAR x)
(RULES
)
"#;
        assert!(matches!(parse(src, "t"), Err(ParseError::NoRules)));
    }

    #[test]
    fn malformed_input_reports_syntax_error() {
        let src = "(GOAL COMPLEXITY";
        assert!(matches!(parse(src, "t"), Err(ParseError::Syntax { .. })));
    }

    #[test]
    fn division_parses_into_a_div_node() {
        let src = r#"
(GOAL COMPLEXITY)
(STARTTERM (FUNCTIONSYMBOLS f))
(VAR x)
(RULES
  f(x) -> f(x / 2) [ x > 1 ]
)
"#;
        let file = parse(src, "t").unwrap();
        assert!(matches!(
            &file.rules[0].rhs[0].args[0],
            PExpr::Div(_, _, _)
        ));
    }
}
