//! Dash CLI - Command line interface for the Dash scripting language
//!
//! # Usage
//!
//! ```text
//! dash run <file>                  Evaluate a file and print its value
//! dash run <file> -f json          Print the value as JSON
//! dash run <file> --ns lib=./lib   Register an import namespace
//! dash eval '<source>'             Evaluate source text
//! dash parse <file>                Show the AST
//! ```

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use dash_parser::parse_chunk;
use dash_runtime::{Evaluator, Value, DEFAULT_MAX_DEPTH};
use dash_stdlib::stdlib_registry;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dash")]
#[command(author, version, about = "Dash scripting language", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a Dash file
    Run {
        /// The Dash file to evaluate
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Import namespace as `name=dir`, may be repeated
        #[arg(long = "ns", value_parser = parse_namespace)]
        namespaces: Vec<(String, PathBuf)>,

        /// Maximum nesting of evaluations before reporting a stack overflow
        #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: usize,
    },

    /// Evaluate Dash source text
    Eval {
        /// The source to evaluate
        source: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Parse a Dash file and show AST (for debugging)
    Parse {
        /// The Dash file to parse
        file: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_namespace(arg: &str) -> Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((name, dir)) if !name.is_empty() && !dir.is_empty() => {
            Ok((name.to_string(), PathBuf::from(dir)))
        }
        _ => Err(format!("expected name=dir, got '{}'", arg)),
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            format,
            namespaces,
            max_depth,
        } => {
            let mut evaluator = Evaluator::with_natives(stdlib_registry()).with_max_depth(max_depth);
            for (name, dir) in namespaces {
                debug!(name = %name, dir = %dir.display(), "namespace from command line");
                evaluator = evaluator.with_namespace(name, dir);
            }
            let result = evaluator.eval_file(&file)?;
            println!("{}", render(&result, format)?);
        }

        Commands::Eval { source, format } => {
            let evaluator = Evaluator::with_natives(stdlib_registry());
            let result = evaluator.eval_str(&source)?;
            println!("{}", render(&result, format)?);
        }

        Commands::Parse { file } => {
            let source = fs::read_to_string(&file)?;
            let chunk = parse_chunk(&source)?;
            println!("{:#?}", chunk);
        }
    }

    Ok(())
}

fn render(value: &Value, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Text => Ok(value.to_string()),
        OutputFormat::Json => serde_json::to_string_pretty(value),
    }
}
