//! End‑to‑end driver: scan → parse → resolve → interpret.
//!
//! A [`Lox`] session owns one interpreter, so globals defined by one `run`
//! stay visible to the next.  That is what the interactive prompt relies on.

use std::io::Write;

use log::{debug, info};
use thiserror::Error;

use crate::ast::{Expr, Stmt};
use crate::error::LoxError;
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::scan;
use crate::value::Value;

/// Exit status for lexical, syntax and resolution errors.
pub const EXIT_STATIC_ERROR: i32 = 65;

/// Exit status for runtime errors.
pub const EXIT_RUNTIME_ERROR: i32 = 70;

/// Why a run did not complete.
#[derive(Debug, Error)]
pub enum RunError {
    /// Scan, parse or resolve errors; nothing was executed.
    #[error("{}", join_lines(.0))]
    Static(Vec<LoxError>),

    /// Execution started and was halted by this error.
    #[error(transparent)]
    Runtime(LoxError),
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Static(_) => EXIT_STATIC_ERROR,
            RunError::Runtime(_) => EXIT_RUNTIME_ERROR,
        }
    }

    /// Every individual diagnostic, in report order.
    pub fn diagnostics(&self) -> Vec<&LoxError> {
        match self {
            RunError::Static(errors) => errors.iter().collect(),
            RunError::Runtime(error) => vec![error],
        }
    }
}

fn join_lines(errors: &[LoxError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct Lox {
    interpreter: Interpreter,
    next_id: usize,
}

impl Default for Lox {
    fn default() -> Self {
        Self::new()
    }
}

impl Lox {
    pub fn new() -> Self {
        Self::with_interpreter(Interpreter::new())
    }

    /// A session whose `print` output goes to `out`.
    pub fn with_output(out: Box<dyn Write>) -> Self {
        Self::with_interpreter(Interpreter::with_output(out))
    }

    /// Allow up to `depth` nested calls before reporting "Stack overflow.".
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.interpreter.set_max_call_depth(depth);
        self
    }

    fn with_interpreter(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            next_id: 0,
        }
    }

    /// Scan and parse `source` as a program, without running it.
    pub fn parse(&mut self, source: &[u8]) -> Result<Vec<Stmt>, RunError> {
        let (tokens, mut errors) = scan(source);

        let mut parser = Parser::new(tokens).with_first_id(self.next_id);
        let parsed = parser.parse();
        self.next_id = parser.next_id();

        match parsed {
            Ok(statements) if errors.is_empty() => Ok(statements),
            Ok(_) => Err(RunError::Static(errors)),
            Err(parse_errors) => {
                errors.extend(parse_errors);
                Err(RunError::Static(errors))
            }
        }
    }

    /// Scan and parse `source` as a single expression.
    pub fn parse_expression(&mut self, source: &[u8]) -> Result<Expr, RunError> {
        let (tokens, mut errors) = scan(source);

        let mut parser = Parser::new(tokens).with_first_id(self.next_id);
        let parsed = parser.parse_expression();
        self.next_id = parser.next_id();

        match parsed {
            Ok(expr) if errors.is_empty() => Ok(expr),
            Ok(_) => Err(RunError::Static(errors)),
            Err(parse_errors) => {
                errors.extend(parse_errors);
                Err(RunError::Static(errors))
            }
        }
    }

    /// Run a whole program.  Nothing executes if any static error was found.
    pub fn run(&mut self, source: &[u8]) -> Result<(), RunError> {
        info!("Running {} byte(s) of source", source.len());

        let statements = self.parse(source)?;

        debug!("Parsed {} statements", statements.len());

        Resolver::new(&mut self.interpreter)
            .resolve(&statements)
            .map_err(RunError::Static)?;

        self.interpreter
            .interpret(&statements)
            .map_err(RunError::Runtime)
    }

    /// Evaluate a single expression against the session's globals.
    pub fn evaluate(&mut self, source: &[u8]) -> Result<Value, RunError> {
        let expr = self.parse_expression(source)?;

        self.interpreter
            .evaluate_expression(&expr)
            .map_err(RunError::Runtime)
    }
}
