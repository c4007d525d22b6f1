//! Tree‑walking evaluator.
//!
//! Statements run for effect and report how control left them ([`Flow`]);
//! expressions evaluate to a single [`Value`].  The active environment is
//! passed down explicitly instead of living in a mutable field, so nothing
//! has to be restored when a block or call unwinds.
//!
//! Variable access uses the hop counts recorded by the
//! [`Resolver`](crate::resolver::Resolver) through [`Interpreter::note_local`]:
//! a resolved reference jumps straight to its frame, an unresolved one is a
//! global and is looked up in the global frame only.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

use log::{debug, info};

use crate::ast::{Expr, ExprId, FunctionDecl, LiteralValue, Stmt};
use crate::class::{LoxClass, LoxInstance};
use crate::environment::{Env, Environment};
use crate::error::{LoxError, Result};
use crate::function::LoxFunction;
use crate::token::{Token, TokenType};
use crate::value::{Callable, NativeFunction, Value};

/// How control left a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Fell off the end; keep going.
    Normal,

    /// A `return` is unwinding to the nearest call boundary.
    Return(Value),
}

/// Nested calls allowed before a call fails with "Stack overflow.".  Kept low
/// enough that an unoptimised build fits in a 2 MiB thread stack.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

pub struct Interpreter {
    globals: Env,
    locals: HashMap<ExprId, usize>,
    out: Box<dyn Write>,
    depth: usize,
    max_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Creates an interpreter printing to stdout, with the `clock` native
    /// defined.
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Creates an interpreter whose `print` output goes to `out`.
    pub fn with_output(out: Box<dyn Write>) -> Self {
        info!("Initializing Interpreter");

        let globals: Env = Rc::new(RefCell::new(Environment::new()));

        debug!("Defining native function 'clock'");

        globals.borrow_mut().define(
            "clock",
            Value::Callable(Callable::Native(Rc::new(NativeFunction {
                name: "clock".to_string(),
                arity: 0,
                func: |_args: &[Value]| {
                    let timestamp: f64 = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map_err(|e: SystemTimeError| format!("Clock error: {}", e))?
                        .as_secs_f64();
                    Ok(Value::Number(timestamp))
                },
            }))),
        );

        Self {
            globals,
            locals: HashMap::new(),
            out,
            depth: 0,
            max_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    /// Raise or lower the call depth limit.  Callers that raise it must run
    /// the interpreter on a thread with a correspondingly larger stack.
    pub fn set_max_call_depth(&mut self, max_depth: usize) {
        info!("Call depth limit set to {}", max_depth);

        self.max_depth = max_depth;
    }

    /// Record that the reference `id` lives `depth` frames out from where it
    /// is evaluated.
    pub fn note_local(&mut self, id: ExprId, depth: usize) {
        debug!("Noting {:?} at depth {}", id, depth);

        self.locals.insert(id, depth);
    }

    /// Interprets a list of statements (a "program") in the global frame.
    /// Stops at the first runtime error.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        debug!("Interpreting {} statements", statements.len());

        let globals = Rc::clone(&self.globals);
        for stmt in statements {
            self.execute(stmt, &globals)?;
        }

        self.out.flush()?;

        info!("Interpretation completed successfully");
        Ok(())
    }

    /// Evaluates a stand‑alone expression against the globals.
    pub fn evaluate_expression(&mut self, expr: &Expr) -> Result<Value> {
        let globals = Rc::clone(&self.globals);
        self.evaluate(expr, &globals)
    }

    /// Runs `statements` inside `env`, returning early on `return`.
    pub fn execute_block(&mut self, statements: &[Stmt], env: Env) -> Result<Flow> {
        for stmt in statements {
            if let Flow::Return(value) = self.execute(stmt, &env)? {
                return Ok(Flow::Return(value));
            }
        }

        Ok(Flow::Normal)
    }

    /// Executes a single statement.
    pub fn execute(&mut self, stmt: &Stmt, env: &Env) -> Result<Flow> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr, env)?;
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr, env)?;
                writeln!(self.out, "{}", value)?;
            }

            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr, env)?,
                    None => Value::Nil,
                };
                debug!("Defining variable '{}' = {}", name.lexeme, value);
                env.borrow_mut().define(&name.lexeme, value);
            }

            Stmt::Block(statements) => {
                return self.execute_block(statements, Environment::child_of(env));
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition, env)?.is_truthy() {
                    return self.execute(then_branch, env);
                } else if let Some(else_stmt) = else_branch {
                    return self.execute(else_stmt, env);
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition, env)?.is_truthy() {
                    if let Flow::Return(value) = self.execute(body, env)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }

            Stmt::Function(decl) => {
                debug!("Defining function '{}'", decl.name.lexeme);

                let function = LoxFunction::new(Rc::clone(decl), Rc::clone(env), false);
                env.borrow_mut().define(
                    &decl.name.lexeme,
                    Value::Callable(Callable::Function(Rc::new(function))),
                );
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr, env)?,
                    None => Value::Nil,
                };
                debug!("Returning value: {}", value);
                return Ok(Flow::Return(value));
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(name, superclass.as_ref(), methods, env)?,
        }

        Ok(Flow::Normal)
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
        env: &Env,
    ) -> Result<()> {
        debug!("Defining class '{}'", name.lexeme);

        let superclass = match superclass {
            Some(expr) => {
                let value = self.evaluate(expr, env)?;
                match value.as_class() {
                    Some(class) => Some(Rc::clone(class)),
                    None => {
                        let token = match expr {
                            Expr::Variable { name, .. } => name,
                            _ => name,
                        };
                        return Err(LoxError::runtime(token, "Superclass must be a class."));
                    }
                }
            }
            None => None,
        };

        env.borrow_mut().define(&name.lexeme, Value::Nil);

        // Methods of a subclass close over a frame holding `super`.
        let method_env = match &superclass {
            Some(class) => {
                let frame = Environment::child_of(env);
                frame.borrow_mut().define(
                    "super",
                    Value::Callable(Callable::Class(Rc::clone(class))),
                );
                frame
            }
            None => Rc::clone(env),
        };

        let methods = methods
            .iter()
            .map(|decl| {
                let is_init = decl.name.lexeme == "init";
                let function = LoxFunction::new(Rc::clone(decl), Rc::clone(&method_env), is_init);
                (decl.name.lexeme.clone(), Rc::new(function))
            })
            .collect();

        let class = LoxClass::new(name.lexeme.clone(), superclass, methods);

        env.borrow_mut()
            .assign(name, Value::Callable(Callable::Class(Rc::new(class))))?;

        info!("Class '{}' defined", name.lexeme);
        Ok(())
    }

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr, env: &Env) -> Result<Value> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::from(s.as_str()),
                LiteralValue::True => Value::Bool(true),
                LiteralValue::False => Value::Bool(false),
                LiteralValue::Nil => Value::Nil,
            }),

            Expr::Grouping(inner) => self.evaluate(inner, env),

            Expr::Unary { operator, right } => {
                let right = self.evaluate(right, env)?;
                match operator.token_type {
                    TokenType::MINUS => match right {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        _ => Err(LoxError::runtime(operator, "Operand must be a number.")),
                    },
                    TokenType::BANG => Ok(Value::Bool(!right.is_truthy())),
                    _ => Err(LoxError::runtime(operator, "Invalid unary operator.")),
                }
            }

            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left, env)?;
                let right = self.evaluate(right, env)?;
                binary(operator, left, right)
            }

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left, env)?;

                let short_circuit = if operator.token_type == TokenType::OR {
                    left.is_truthy()
                } else {
                    !left.is_truthy()
                };

                if short_circuit {
                    Ok(left)
                } else {
                    self.evaluate(right, env)
                }
            }

            Expr::Variable { id, name } => self.look_up_variable(*id, name, env),

            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value, env)?;

                match self.locals.get(id) {
                    Some(&distance) => Environment::assign_at(env, distance, name, value.clone())?,
                    None => self.globals.borrow_mut().assign(name, value.clone())?,
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee, env)?;

                let mut args = Vec::with_capacity(arguments.len());
                for arg in arguments {
                    args.push(self.evaluate(arg, env)?);
                }

                let Some(callable) = callee.as_callable() else {
                    return Err(LoxError::runtime(
                        paren,
                        "Can only call functions and classes.",
                    ));
                };

                if args.len() != callable.arity() {
                    return Err(LoxError::runtime(
                        paren,
                        format!(
                            "Expected {} arguments but got {}.",
                            callable.arity(),
                            args.len()
                        ),
                    ));
                }

                self.call(callable, paren, args)
            }

            Expr::Get { object, name } => match self.evaluate(object, env)? {
                Value::Instance(instance) => LoxInstance::get(&instance, name),
                _ => Err(LoxError::runtime(name, "Only instances have properties.")),
            },

            Expr::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object, env)? else {
                    return Err(LoxError::runtime(name, "Only instances have fields."));
                };

                let value = self.evaluate(value, env)?;
                instance.borrow_mut().set(name, value.clone());
                Ok(value)
            }

            Expr::This { id, keyword } => self.look_up_variable(*id, keyword, env),

            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method, env),
        }
    }

    fn evaluate_super(
        &mut self,
        id: ExprId,
        keyword: &Token,
        method: &Token,
        env: &Env,
    ) -> Result<Value> {
        let Some(&distance) = self.locals.get(&id) else {
            return Err(LoxError::runtime(keyword, "Unresolved 'super'."));
        };

        let superclass = Environment::get_at(env, distance, keyword)?;
        let Some(superclass) = superclass.as_class() else {
            return Err(LoxError::runtime(keyword, "Superclass must be a class."));
        };

        // `this` lives in the frame just inside the one holding `super`.
        let this = Token::synthetic("this", keyword.line);
        let object = Environment::get_at(env, distance.saturating_sub(1), &this)?;

        match superclass.find_method(&method.lexeme) {
            Some(found) => Ok(Value::Callable(Callable::Function(Rc::new(
                found.bind(object),
            )))),
            None => Err(LoxError::runtime(
                method,
                format!("Undefined property '{}'.", method.lexeme),
            )),
        }
    }

    /// Invoke `callable`, tracking how deep the host stack has grown.
    fn call(&mut self, callable: &Callable, paren: &Token, args: Vec<Value>) -> Result<Value> {
        if let Callable::Native(_) = callable {
            return callable.call(self, paren, args);
        }

        if self.depth >= self.max_depth {
            debug!("Call depth {} reached at line {}", self.depth, paren.line);
            return Err(LoxError::runtime(paren, "Stack overflow."));
        }

        self.depth += 1;
        let result = callable.call(self, paren, args);
        self.depth -= 1;

        result
    }

    fn look_up_variable(&self, id: ExprId, name: &Token, env: &Env) -> Result<Value> {
        match self.locals.get(&id) {
            Some(&distance) => Environment::get_at(env, distance, name),
            None => self.globals.borrow().get(name),
        }
    }
}

fn binary(operator: &Token, left: Value, right: Value) -> Result<Value> {
    use Value::{Bool, Number};

    match (&operator.token_type, left, right) {
        (TokenType::EQUAL_EQUAL, l, r) => Ok(Bool(l == r)),
        (TokenType::BANG_EQUAL, l, r) => Ok(Bool(l != r)),

        (TokenType::PLUS, Number(a), Number(b)) => Ok(Number(a + b)),
        (TokenType::PLUS, Value::String(a), Value::String(b)) => {
            Ok(Value::from(format!("{}{}", a, b)))
        }
        (TokenType::PLUS, _, _) => Err(LoxError::runtime(
            operator,
            "Operands must be two numbers or two strings.",
        )),

        (TokenType::MINUS, Number(a), Number(b)) => Ok(Number(a - b)),
        (TokenType::STAR, Number(a), Number(b)) => Ok(Number(a * b)),
        (TokenType::SLASH, Number(a), Number(b)) => Ok(Number(a / b)),
        (TokenType::GREATER, Number(a), Number(b)) => Ok(Bool(a > b)),
        (TokenType::GREATER_EQUAL, Number(a), Number(b)) => Ok(Bool(a >= b)),
        (TokenType::LESS, Number(a), Number(b)) => Ok(Bool(a < b)),
        (TokenType::LESS_EQUAL, Number(a), Number(b)) => Ok(Bool(a <= b)),

        (
            TokenType::MINUS
            | TokenType::STAR
            | TokenType::SLASH
            | TokenType::GREATER
            | TokenType::GREATER_EQUAL
            | TokenType::LESS
            | TokenType::LESS_EQUAL,
            _,
            _,
        ) => Err(LoxError::runtime(operator, "Operands must be numbers.")),

        _ => Err(LoxError::runtime(operator, "Invalid binary operator.")),
    }
}
