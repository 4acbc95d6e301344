use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use runescript::compiler::codegen::BinaryScript;
use runescript::compiler::link::link_all;
use runescript::compiler::symbol::SymbolTable;
use runescript::compiler::{CompileOutput, Compiler, SourceFile};
use runescript::config::CompilerConfig;
use runescript::error::AppError;
use runescript::runtime::{core_executors, Execution, ReturnValues, ScriptExecutor};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "runescript-cli", about = "Compile and run scripts", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration with commands, configs, constants and variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    /// Log pipeline stages (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Report diagnostics without generating code
    Check { files: Vec<PathBuf> },
    /// Print the generated blocks of every script
    Compile {
        files: Vec<PathBuf>,
        #[arg(long)]
        no_optimize: bool,
    },
    /// Compile, link and execute one script
    Run {
        files: Vec<PathBuf>,
        /// Full script name, e.g. `[proc,main]`
        #[arg(long)]
        script: String,
        /// Int arguments, bound to the script's first int parameters
        #[arg(long = "arg", allow_negative_numbers = true)]
        args: Vec<i32>,
    },
    /// Print the configuration JSON schema
    Schema,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run_command(&cli) {
        if cli.json {
            let json = serde_json::json!({ "error": e });
            println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        } else {
            eprintln!("Error: {}", e.report());
        }
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "runescript=debug" } else { "warn" }));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_command(cli: &Cli) -> Result<(), AppError> {
    let config = match &cli.config {
        Some(path) => CompilerConfig::load(path)?,
        None => CompilerConfig::default(),
    };

    match &cli.command {
        Commands::Schema => {
            println!(
                "{}",
                serde_json::to_string_pretty(&CompilerConfig::schema()).unwrap_or_default()
            );
            Ok(())
        }
        Commands::Check { files } => {
            let output = compile(&config, files, false, cli.json)?;
            if !cli.json {
                println!("{} script(s) ok", output.scripts.len());
            }
            Ok(())
        }
        Commands::Compile { files, no_optimize } => {
            let output = compile(&config, files, !no_optimize && config.optimize, cli.json)?;
            print_scripts(&config, &output.scripts, cli.json)
        }
        Commands::Run {
            files,
            script,
            args,
        } => {
            let output = compile(&config, files, config.optimize, cli.json)?;
            let values = execute(&config, &output.scripts, script, args)?;
            print_values(&values, cli.json);
            Ok(())
        }
    }
}

// ── Pipeline ─────────────────────────────────────────────────────

fn read_sources(files: &[PathBuf]) -> Result<Vec<SourceFile>, AppError> {
    files
        .iter()
        .map(|path| {
            fs::read_to_string(path)
                .map(|text| SourceFile::new(path.display().to_string(), text))
                .map_err(|source| AppError::Read {
                    path: path.clone(),
                    source,
                })
        })
        .collect()
}

/// Compile `files`, printing every diagnostic. `Err` when there were any.
fn compile(
    config: &CompilerConfig,
    files: &[PathBuf],
    optimize: bool,
    raw_json: bool,
) -> Result<CompileOutput, AppError> {
    let sources = read_sources(files)?;
    let symbols = SymbolTable::from_config(config)?;
    let mut options = config.options();
    options.optimize = optimize;
    let compiler = Compiler::new(&symbols, config.instruction_map()?, options);
    let output = compiler.compile(&sources);
    if output.has_errors() {
        report(&output, &sources, raw_json);
        return Err(AppError::Compile(output.diagnostics.len()));
    }
    Ok(output)
}

fn report(output: &CompileOutput, sources: &[SourceFile], raw_json: bool) {
    if raw_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output.diagnostics).unwrap_or_default()
        );
    } else {
        for diagnostic in &output.diagnostics {
            let text = sources
                .iter()
                .find(|source| source.name == diagnostic.file)
                .map_or("", |source| source.text.as_str());
            eprintln!("{}: {}", diagnostic.file, diagnostic.error.format_with_source(text));
        }
    }
}

fn execute(
    config: &CompilerConfig,
    scripts: &[BinaryScript],
    name: &str,
    args: &[i32],
) -> Result<ReturnValues, AppError> {
    let cache = link_all(scripts)?;
    let executors = core_executors(&config.instruction_map()?)?;
    let executor = ScriptExecutor::new(executors, cache, config.pool_sizes());
    let execution = executor.execute(name, |runtime| {
        for (slot, &value) in (0..).zip(args) {
            runtime.set_int_local(slot, value)?;
        }
        Ok(())
    })?;
    match execution {
        Execution::Completed(values) => Ok(values),
        Execution::Suspended(_) => Err(AppError::Suspended(name.to_string())),
    }
}

// ── Output ───────────────────────────────────────────────────────

fn print_scripts(config: &CompilerConfig, scripts: &[BinaryScript], raw_json: bool) -> Result<(), AppError> {
    if raw_json {
        println!("{}", serde_json::to_string_pretty(scripts).unwrap_or_default());
        return Ok(());
    }
    let map = config.instruction_map()?;
    for script in scripts {
        println!("{}", script.name);
        print!("{}", script.blocks.render(&map));
    }
    Ok(())
}

#[derive(Serialize)]
struct RunOutput<'a> {
    result: &'a ReturnValues,
}

fn print_values(values: &ReturnValues, raw_json: bool) {
    if raw_json {
        let json = RunOutput { result: values };
        println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        return;
    }
    for value in &values.ints {
        println!("{value}");
    }
    for value in &values.strings {
        println!("{value:?}");
    }
    for value in &values.longs {
        println!("{value}L");
    }
}
