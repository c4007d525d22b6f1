use std::fs::File;
use std::io::{self, BufRead, Write};
use std::ops::Deref;
use std::path::PathBuf;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use memmap2::Mmap;

use rox::ast_printer::AstPrinter;
use rox::lox::{Lox, RunError, EXIT_STATIC_ERROR};
use rox::scanner::Scanner;
use rox::token::Token;

/// Stack reserved for the thread that runs Lox code.
const INTERPRETER_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Call depth the CLI allows; fits in [`INTERPRETER_STACK_SIZE`] even
/// unoptimised.
const CLI_MAX_CALL_DEPTH: usize = 1024;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lox language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize {
        filename: Option<PathBuf>,

        /// Emit the token stream as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Parses input from a file and prints its AST
    Parse {
        filename: Option<PathBuf>,

        /// Parse a whole program instead of a single expression
        #[arg(long)]
        program: bool,
    },

    /// Evaluates input from a file as a single expression and prints the result
    Evaluate { filename: Option<PathBuf> },

    /// Runs input from a file as a Lox program
    Run { filename: Option<PathBuf> },

    /// Starts an interactive prompt
    Repl,
}

/// Source bytes, memory‑mapped when non‑empty.
enum Source {
    Mapped(Mmap),
    Empty,
}

impl Deref for Source {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Source::Mapped(map) => &map[..],
            Source::Empty => &[],
        }
    }
}

/// Maps the contents of a file into memory.
fn read_file(filename: &PathBuf) -> Result<Source> {
    info!("Reading file: {:?}", filename);
    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;

    let len = file
        .metadata()
        .context(format!("Failed to stat file {:?}", filename))?
        .len();

    // Zero‑length mappings are rejected on some platforms.
    if len == 0 {
        return Ok(Source::Empty);
    }

    // SAFETY: the file is only read, and only for the lifetime of this process.
    let map = unsafe { Mmap::map(&file) }.context(format!("Failed to map file {:?}", filename))?;

    info!("Mapped {} bytes from {:?}", map.len(), filename);

    Ok(Source::Mapped(map))
}

fn init_logger() -> Result<()> {
    // Create or open the log file
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    Builder::new()
        .format(|buf, record| {
            // Strip 'rox::' from module path
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("rox::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "{} [{}:{}] - {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

fn session() -> Lox {
    Lox::new().with_max_call_depth(CLI_MAX_CALL_DEPTH)
}

fn report(error: &RunError) -> ! {
    for diagnostic in error.diagnostics() {
        debug!("Reporting: {}", diagnostic);
        eprintln!("{}", diagnostic);
    }

    std::process::exit(error.exit_code());
}

fn no_input() -> Result<()> {
    info!("No filepath provided");

    println!("No input filepath was provided. Exiting...");

    Ok(())
}

fn tokenize(filename: &PathBuf, json: bool) -> Result<()> {
    let source = read_file(filename)?;
    let mut tokens: Vec<Token> = Vec::new();
    let mut tokenized = true;

    for token in Scanner::new(&source) {
        match token {
            Ok(token) => {
                if !json {
                    println!("{}", token);
                }
                tokens.push(token);
            }

            Err(e) => {
                tokenized = false;

                debug!("Tokenization debug: {}", e);

                eprintln!("{}", e);
            }
        }
    }

    if json {
        let rendered = serde_json::to_string_pretty(&tokens).context("Failed to encode tokens")?;
        println!("{}", rendered);
    }

    if !tokenized {
        debug!("Tokenization failed, exiting with code {}", EXIT_STATIC_ERROR);

        std::process::exit(EXIT_STATIC_ERROR);
    }

    info!("Tokenization completed successfully");
    Ok(())
}

fn parse(filename: &PathBuf, program: bool) -> Result<()> {
    let source = read_file(filename)?;
    let mut lox = session();

    let rendered = if program {
        lox.parse(&source)
            .map(|statements| AstPrinter::print_program(&statements))
    } else {
        lox.parse_expression(&source)
            .map(|expr| AstPrinter::print(&expr))
    };

    match rendered {
        Ok(ast) => println!("{}", ast),
        Err(e) => report(&e),
    }

    info!("Parse subcommand completed");
    Ok(())
}

fn evaluate(filename: &PathBuf) -> Result<()> {
    let source = read_file(filename)?;
    let mut lox = session();

    match lox.evaluate(&source) {
        Ok(value) => println!("{}", value),
        Err(e) => report(&e),
    }

    info!("Evaluate subcommand completed");
    Ok(())
}

fn run(filename: &PathBuf) -> Result<()> {
    let source = read_file(filename)?;

    debug!("Provided input:\n{}", String::from_utf8_lossy(&source));

    if let Err(e) = session().run(&source) {
        report(&e);
    }

    info!("Program executed successfully");
    Ok(())
}

/// Read‑eval‑print loop.  Errors are reported and the session continues;
/// definitions persist between lines.
fn repl() -> Result<()> {
    info!("Starting REPL");

    let mut lox = session();
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            break;
        }

        if let Err(e) = lox.run(line.as_bytes()) {
            for diagnostic in e.diagnostics() {
                eprintln!("{}", diagnostic);
            }
        }
    }

    info!("REPL finished");
    Ok(())
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    // Initialize logger only if --log flag is provided
    if args.log {
        init_logger()?;
    } else {
        // Initialize a minimal logger to avoid "no logger" errors
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    let worker = thread::Builder::new()
        .name("interpreter".into())
        .stack_size(INTERPRETER_STACK_SIZE)
        .spawn(move || dispatch(args.commands))
        .context("Failed to spawn interpreter thread")?;

    worker
        .join()
        .map_err(|_| anyhow!("Interpreter thread panicked"))?
}

fn dispatch(commands: Commands) -> Result<()> {
    match commands {
        Commands::Tokenize { filename, json } => match filename {
            Some(filename) => tokenize(&filename, json),
            None => no_input(),
        },

        Commands::Parse { filename, program } => match filename {
            Some(filename) => parse(&filename, program),
            None => no_input(),
        },

        Commands::Evaluate { filename } => match filename {
            Some(filename) => evaluate(&filename),
            None => no_input(),
        },

        Commands::Run { filename } => match filename {
            Some(filename) => run(&filename),
            None => no_input(),
        },

        Commands::Repl => repl(),
    }
}
