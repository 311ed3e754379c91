#![allow(dead_code)]

use loris_engine::{Analysis, AnalysisOutcome, AnalysisSettings};
use loris_ir::ItsProblem;

pub fn load_benchmark(name: &str) -> ItsProblem {
    let path = format!("{}/../../benchmarks/{name}", env!("CARGO_MANIFEST_DIR"));
    let src = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to load {path}: {e}"));
    loris_koat::parse_problem(&src, name)
        .unwrap_or_else(|e| panic!("Failed to parse {name}: {e}"))
}

pub fn analyze_benchmark(name: &str) -> (ItsProblem, AnalysisOutcome) {
    let mut its = load_benchmark(name);
    let outcome = Analysis::analyze(&mut its, AnalysisSettings::untimed());
    (its, outcome)
}

pub const ALL_BENCHMARKS: &[&str] = &[
    "single-counter.koat",
    "nest-parallel.koat",
    "exponential.koat",
    "branch-unsat.koat",
    "unbounded-cost.koat",
    "tree.koat",
];
