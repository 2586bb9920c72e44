//! Stack file formatter and checker
//!
//! # Usage
//!
//! ```bash
//! # Normalize a stack to JSON
//! stackfmt procedures/power-on.ycs
//!
//! # Convert to the legacy XML format
//! stackfmt procedures/power-on.ycs --xml
//!
//! # Fail if any step cannot run as authored
//! stackfmt procedures/power-on.ycs --check
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use mission_stack::stack::{StackDocument, StackFormat};
use mission_stack::ConfigLoader;

#[derive(Parser)]
#[command(name = "stackfmt")]
#[command(version = "0.1.0")]
#[command(about = "Normalize, convert and check command stack files")]
struct Cli {
    /// Stack file (.ycs, .json or .xml)
    file: PathBuf,

    /// Print the legacy XML format instead of JSON
    #[arg(long)]
    xml: bool,

    /// Only check the steps; exit non-zero on problems
    #[arg(long)]
    check: bool,

    /// Print the effective stack configuration and exit
    #[arg(long)]
    show_config: bool,

    /// Config directory holding stack.yaml
    #[arg(long, env = "STACK_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,
}

// =============================================================================
// MAIN
// =============================================================================

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("stackfmt: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = ConfigLoader::new(&cli.config_dir).load()?;
    if cli.show_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    let document =
        StackDocument::load(&cli.file).with_context(|| format!("Failed to load {}", cli.file.display()))?;

    if cli.check {
        let problems = document.check();
        for problem in &problems {
            println!("step {}: {}", problem.index + 1, problem.message);
        }
        if problems.is_empty() {
            println!("{}: {} steps ok", cli.file.display(), document.steps.len());
            return Ok(ExitCode::SUCCESS);
        }
        return Ok(ExitCode::FAILURE);
    }

    let format = if cli.xml { StackFormat::Xml } else { StackFormat::Json };
    println!("{}", document.format(format)?);
    Ok(ExitCode::SUCCESS)
}
