/// Options for a single analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Run the expensive rule preprocessing pass up front.
    pub do_preprocessing: bool,
    /// Try to drop implied `cost >= 0` guard atoms during preprocessing.
    pub eliminate_cost_constraints: bool,
    /// Re-emit the fully simplified problem in KoAT syntax into the proof.
    pub print_simplified_koat: bool,
    /// Collect dot subgraphs of every simplification step.
    pub dot_output: bool,
    /// Overall wall-clock budget in seconds; 0 disables all timeouts.
    pub timeout_secs: u64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            do_preprocessing: true,
            eliminate_cost_constraints: true,
            print_simplified_koat: false,
            dot_output: false,
            timeout_secs: 60,
        }
    }
}

impl AnalysisSettings {
    /// Settings without any time budget, for deterministic tests.
    pub fn untimed() -> Self {
        Self {
            timeout_secs: 0,
            ..Self::default()
        }
    }
}
