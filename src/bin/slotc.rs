//! Command-line driver: reads a textual IR module and prints the assembled program.

use std::path::PathBuf;
use std::process::ExitCode;

use bumpalo::Bump;
use clap::{Parser, ValueEnum};

use slotc::core::{CompilationSession, CompileError, CompileResult};
use slotc::ir::Module;
use slotc::program::{AssembleOptions, OutputFormat, ProgramAssembler};

#[derive(Parser)]
#[command(name = "slotc")]
#[command(about = "Lower SSA IR to a stackless flat-memory machine.", long_about = None)]
struct Cli {
    /// Print the annotated diagnostics listing instead of the artifact.
    #[arg(short = 'a', long)]
    asm: bool,

    /// Report at least this many slots in `n_vars`.
    #[arg(short = 'N', long, value_name = "N", default_value_t = 0)]
    min_slots: u32,

    /// Function whose return value is the program's outcome.
    #[arg(long, value_name = "NAME", default_value = "main")]
    entry: String,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Print session statistics to stderr.
    #[arg(long)]
    stats: bool,

    input: PathBuf,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> ExitCode {
    env_logger::init();
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}

fn try_main() -> CompileResult<()> {
    let cli = Cli::parse();

    let source = std::fs::read_to_string(&cli.input).map_err(|source| CompileError::Io {
        path: cli.input.clone(),
        source,
    })?;
    let module = Module::parse(&source)?;
    log::debug!(
        "read {}: {} function(s), {} global(s)",
        cli.input.display(),
        module.functions.len(),
        module.globals.len()
    );

    let options = AssembleOptions {
        min_slots: cli.min_slots,
        entry: cli.entry,
    };
    let format = match (cli.asm, cli.format) {
        (true, _) => OutputFormat::Asm,
        (false, Format::Text) => OutputFormat::Text,
        (false, Format::Json) => OutputFormat::Json,
    };

    let arena = Bump::new();
    let mut session = CompilationSession::new(&arena);
    let program = ProgramAssembler::new(&mut session, &module, options).assemble()?;
    let output = program.render(format)?;
    print!("{output}");
    if format == OutputFormat::Json {
        println!();
    }
    if cli.stats {
        eprintln!("{}", session.stats());
    }
    Ok(())
}
