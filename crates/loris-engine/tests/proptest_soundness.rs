//! Property-based soundness: for randomly generated counting loops, the
//! witnessing bound evaluated on any concrete input never exceeds the
//! cost of actually running the program from that input.

use num::BigRational;
use proptest::prelude::*;

use loris_engine::{Analysis, AnalysisSettings};
use loris_ir::expr::Expr;
use loris_ir::rel::{CmpOp, Rel};
use loris_ir::{Complexity, ItsProblem, VarId};

fn counting_program(decrement: i64, threshold: i64, cost: i64) -> ItsProblem {
    let src = format!(
        "(GOAL COMPLEXITY)\n\
         (STARTTERM (FUNCTIONSYMBOLS l0))\n\
         (VAR x)\n\
         (RULES\n\
           l0(x) -> l1(x)\n\
           l1(x) -{{ {cost} }}> l1(x - {decrement}) [ x > {threshold} ]\n\
         )"
    );
    loris_koat::parse_problem(&src, "generated").expect("generated program parses")
}

fn eval_rel(rel: &Rel, var: VarId, value: i64) -> bool {
    let assign = |e: &Expr| {
        e.subs_var(var, &Expr::int(value))
            .as_num()
            .cloned()
            .expect("closed guard atom")
    };
    let (l, r) = (assign(&rel.lhs), assign(&rel.rhs));
    match rel.op {
        CmpOp::Lt => l < r,
        CmpOp::Le => l <= r,
        CmpOp::Gt => l > r,
        CmpOp::Ge => l >= r,
        CmpOp::Eq => l == r,
    }
}

proptest! {
    // Every case drives the full pipeline including Z3, so keep the
    // number of cases small.
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn derived_bounds_never_exceed_simulated_cost(
        decrement in 1i64..=3,
        threshold in 0i64..=3,
        cost in 1i64..=5,
    ) {
        let mut its = counting_program(decrement, threshold, cost);
        let outcome = Analysis::analyze(&mut its, AnalysisSettings::untimed());

        // the true class is at most linear
        prop_assert!(outcome.runtime.cpx <= Complexity::Poly(1));

        let x = its.vars.lookup("x").unwrap();
        for x0 in 0i64..=15 {
            // concrete semantics, including the entry rule's unit cost
            let mut cur = x0;
            let mut total = 1i64;
            while cur > threshold {
                total += cost;
                cur -= decrement;
            }

            let guard_holds = outcome
                .runtime
                .guard
                .iter()
                .all(|atom| eval_rel(atom, x, x0));
            if !guard_holds {
                continue;
            }
            let bound = outcome
                .runtime
                .bound
                .subs_var(x, &Expr::int(x0))
                .as_num()
                .cloned()
                .expect("closed bound");
            prop_assert!(
                bound <= BigRational::from_integer(total.into()),
                "bound {bound} exceeds simulated cost {total} at x = {x0} \
                 (decrement {decrement}, threshold {threshold}, cost {cost})"
            );
        }
    }
}
