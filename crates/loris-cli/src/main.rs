use std::fs;
use std::path::PathBuf;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use loris_engine::{Analysis, AnalysisSettings};

#[derive(Parser)]
#[command(name = "loris")]
#[command(about = "Worst-case lower bounds for integer transition systems")]
#[command(version)]
struct Cli {
    /// Path to the KoAT problem file
    file: PathBuf,

    /// Disable the up-front rule preprocessing pass
    #[arg(long, default_value_t = false)]
    no_preprocess: bool,

    /// Keep `cost >= 0` guard atoms instead of eliminating implied ones
    #[arg(long, default_value_t = false)]
    no_cost_elimination: bool,

    /// Print the fully simplified problem in KoAT syntax
    #[arg(long, default_value_t = false)]
    print_simplified: bool,

    /// Write a dot graph of all simplification steps to this file
    #[arg(long)]
    dot: Option<PathBuf>,

    /// Overall timeout in seconds (0 disables all time budgets)
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Print the proof log to stdout
    #[arg(long, default_value_t = false)]
    proof: bool,

    /// Output format: text | json
    #[arg(long, default_value = "text")]
    format: String,
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut its = loris_koat::load_file(&cli.file)?;

    let settings = AnalysisSettings {
        do_preprocessing: !cli.no_preprocess,
        eliminate_cost_constraints: !cli.no_cost_elimination,
        print_simplified_koat: cli.print_simplified,
        dot_output: cli.dot.is_some(),
        timeout_secs: cli.timeout,
    };
    let outcome = Analysis::analyze(&mut its, settings);

    if cli.proof {
        println!("{}", outcome.proof);
    }
    if let Some(koat) = &outcome.simplified_koat {
        println!("{koat}");
    }
    if let (Some(path), Some(dot)) = (&cli.dot, &outcome.dot) {
        fs::write(path, dot).into_diagnostic()?;
    }

    match cli.format.as_str() {
        "json" => println!(
            "{}",
            serde_json::to_string_pretty(&outcome.runtime.to_json(&its)).into_diagnostic()?
        ),
        _ => print!("{}", outcome.runtime.render(&its)),
    }
    Ok(())
}
