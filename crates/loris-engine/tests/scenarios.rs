//! End-to-end scenarios: each benchmark runs through the full pipeline
//! (parse, lower, simplify, asymptotic check) with the real Z3 backend.

mod common;

use common::analyze_benchmark;
use loris_ir::Complexity;
use num::BigInt;

#[test]
fn single_counter_is_linear() {
    let (its, outcome) = analyze_benchmark("single-counter.koat");
    assert_eq!(outcome.runtime.cpx, Complexity::Poly(1));
    // the witnessing cost is the counter itself
    let x = its.vars.lookup("x").unwrap();
    assert!(outcome.runtime.bound.has_var(x));
}

#[test]
fn nested_parallel_loops_are_quadratic() {
    let (_, outcome) = analyze_benchmark("nest-parallel.koat");
    assert_eq!(outcome.runtime.cpx, Complexity::Poly(2));
}

#[test]
fn doubling_cost_is_exponential() {
    let (_, outcome) = analyze_benchmark("exponential.koat");
    assert_eq!(outcome.runtime.cpx, Complexity::Exp);
}

#[test]
fn contradictory_branches_are_constant() {
    let (_, outcome) = analyze_benchmark("branch-unsat.koat");
    assert_eq!(outcome.runtime.cpx, Complexity::Const);
}

#[test]
fn unbounded_temporary_cost_is_infinite() {
    let (_, outcome) = analyze_benchmark("unbounded-cost.koat");
    assert_eq!(outcome.runtime.cpx, Complexity::Infty);
}

#[test]
fn tree_paths_accumulate_their_constant_cost() {
    let (_, outcome) = analyze_benchmark("tree.koat");
    assert_eq!(outcome.runtime.cpx, Complexity::Const);
    let bound = outcome
        .runtime
        .bound
        .as_int()
        .expect("constant bound for a loop-free program");
    assert!(bound >= BigInt::from(2));
}

#[test]
fn proof_log_documents_the_pipeline() {
    let (_, outcome) = analyze_benchmark("single-counter.koat");
    assert!(outcome.proof.contains("Pre-processing the ITS problem"));
    assert!(outcome
        .proof
        .contains("Simplification by acceleration and chaining"));
    assert!(outcome.proof.contains("Computing asymptotic complexity"));
}

#[test]
fn dot_output_is_produced_on_request() {
    let mut its = common::load_benchmark("single-counter.koat");
    let settings = loris_engine::AnalysisSettings {
        dot_output: true,
        print_simplified_koat: true,
        ..loris_engine::AnalysisSettings::untimed()
    };
    let outcome = loris_engine::Analysis::analyze(&mut its, settings);
    let dot = outcome.dot.expect("dot output requested");
    assert!(dot.starts_with("digraph {"));
    assert!(dot.contains("Result"));
    let koat = outcome.simplified_koat.expect("koat output requested");
    assert!(koat.contains("(RULES"));
}
