//! Tree-walking evaluator for parsed fragments.
//!
//! Variables live in the `Interpreter` and persist across `execute` calls so
//! a later step can reuse values an earlier step computed. The only way out
//! of the sandbox is the `HostBridge`: every call that is not a builtin must
//! name a function the host provides.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    error::SandboxError,
    parser::{parse_program, BinOp, CmpOp, Expr, FPart, Stmt, Target, UnaryOp},
    value::{self, as_float, as_int, repr_form, str_form, truthy, type_name},
};

/// Default number of statements and loop iterations one fragment may run.
pub const DEFAULT_OPERATION_BUDGET: u64 = 100_000;

/// Longest string or list a repetition may build.
pub const MAX_SEQUENCE_LEN: usize = 1_000_000;

const BUILTINS: &[&str] = &[
    "print", "str", "repr", "len", "int", "float", "bool", "round", "min", "max", "sum", "sorted",
    "abs", "list", "range", "enumerate", "zip",
];

/// What a host function asked the interpreter to do with its result.
#[derive(Debug, Clone, PartialEq)]
pub enum HostReply {
    /// Hand the value back to the calling expression.
    Value(Value),
    /// Stop executing the fragment; the run is finished with this value.
    Finish(Value),
}

/// The host side of the sandbox boundary.
pub trait HostBridge {
    /// True when `name` is a callable host function.
    fn provides(&self, name: &str) -> bool;

    /// Invoke a host function. `Err` carries a message that becomes the
    /// fragment's error.
    fn call(
        &mut self,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<HostReply, String>;
}

/// How a fragment ended when it did not raise.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    /// Ran to the end.
    Completed,
    /// A host function returned `HostReply::Finish`.
    Finished(Value),
}

/// Result of one `execute` call. `stdout` holds everything printed before the
/// fragment ended, including when it failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub stdout: String,
    pub result: Result<ExecOutcome, SandboxError>,
}

pub struct Interpreter {
    variables: HashMap<String, Value>,
    authorized_imports: Vec<String>,
    operation_budget: u64,
}

impl Interpreter {
    pub fn new(authorized_imports: Vec<String>) -> Self {
        Self {
            variables: HashMap::new(),
            authorized_imports,
            operation_budget: DEFAULT_OPERATION_BUDGET,
        }
    }

    pub fn with_operation_budget(mut self, budget: u64) -> Self {
        self.operation_budget = budget;
        self
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Forget every variable, e.g. between independent runs.
    pub fn reset(&mut self) {
        self.variables.clear();
    }

    /// Parse and run `code`, routing non-builtin calls to `host`.
    pub fn execute(&mut self, code: &str, host: &mut dyn HostBridge) -> Execution {
        let program = match parse_program(code) {
            Ok(program) => program,
            Err(err) => {
                return Execution { stdout: String::new(), result: Err(err) };
            }
        };
        debug!(statements = program.len(), "executing fragment");

        let mut frame = Frame {
            variables: &mut self.variables,
            authorized_imports: &self.authorized_imports,
            host,
            stdout: String::new(),
            operations: 0,
            budget: self.operation_budget,
        };

        let result = match frame.block(&program) {
            Ok(()) => Ok(ExecOutcome::Completed),
            Err(Signal::Finish(value)) => Ok(ExecOutcome::Finished(value)),
            Err(Signal::Raise(err)) => Err(err),
            Err(Signal::Break) | Err(Signal::Continue) => Err(SandboxError::Syntax {
                line: 0,
                message: "'break' or 'continue' outside loop".to_string(),
            }),
        };
        Execution { stdout: frame.stdout, result }
    }
}

// ── Evaluation ───────────────────────────────────────────────────────────────

enum Signal {
    Raise(SandboxError),
    Finish(Value),
    Break,
    Continue,
}

impl From<SandboxError> for Signal {
    fn from(err: SandboxError) -> Self {
        Signal::Raise(err)
    }
}

type Flow<T> = Result<T, Signal>;

struct Frame<'a, 'h> {
    variables: &'a mut HashMap<String, Value>,
    authorized_imports: &'a [String],
    host: &'a mut (dyn HostBridge + 'h),
    stdout: String,
    operations: u64,
    budget: u64,
}

impl Frame<'_, '_> {
    fn tick(&mut self) -> Flow<()> {
        self.operations += 1;
        if self.operations > self.budget {
            return Err(SandboxError::Budget(self.budget).into());
        }
        Ok(())
    }

    fn block(&mut self, stmts: &[Stmt]) -> Flow<()> {
        for stmt in stmts {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Stmt) -> Flow<()> {
        self.tick()?;
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
            Stmt::Assign(target, expr) => {
                let value = self.eval(expr)?;
                self.assign(target, value)?;
            }
            Stmt::AugAssign(target, op, expr) => {
                let current = match target {
                    Target::Name(name) => self.lookup(name)?,
                    Target::Subscript { container, index } => {
                        let base = self.lookup(container)?;
                        let index = self.eval(index)?;
                        subscript(&base, &index)?
                    }
                    Target::Tuple(_) => {
                        return Err(SandboxError::Type("illegal augmented assignment".into()).into())
                    }
                };
                let operand = self.eval(expr)?;
                let updated = binary(*op, &current, &operand)?;
                self.assign(target, updated)?;
            }
            Stmt::If { branches, otherwise } => {
                for (condition, body) in branches {
                    if truthy(&self.eval(condition)?) {
                        return self.block(body);
                    }
                }
                self.block(otherwise)?;
            }
            Stmt::For { target, iter, body } => {
                let items = iterate(&self.eval(iter)?)?;
                for item in items {
                    self.tick()?;
                    self.assign(target, item)?;
                    match self.block(body) {
                        Ok(()) | Err(Signal::Continue) => {}
                        Err(Signal::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
            }
            Stmt::While { condition, body } => loop {
                self.tick()?;
                if !truthy(&self.eval(condition)?) {
                    break;
                }
                match self.block(body) {
                    Ok(()) | Err(Signal::Continue) => {}
                    Err(Signal::Break) => break,
                    Err(other) => return Err(other),
                }
            },
            Stmt::Import { module, bindings } => {
                if !self.import_allowed(module) {
                    return Err(SandboxError::Import {
                        module: module.clone(),
                        allowed: self.authorized_imports.to_vec(),
                    }
                    .into());
                }
                for name in bindings {
                    self.variables
                        .insert(name.clone(), Value::String(format!("<module '{}'>", module)));
                }
            }
            Stmt::Pass => {}
            Stmt::Break => return Err(Signal::Break),
            Stmt::Continue => return Err(Signal::Continue),
        }
        Ok(())
    }

    fn import_allowed(&self, module: &str) -> bool {
        self.authorized_imports.iter().any(|allowed| {
            allowed == "*"
                || allowed == module
                || allowed
                    .strip_suffix(".*")
                    .map(|prefix| module == prefix || module.starts_with(&format!("{}.", prefix)))
                    .unwrap_or(false)
                || module.starts_with(&format!("{}.", allowed))
        })
    }

    fn lookup(&self, name: &str) -> Flow<Value> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| SandboxError::Name(name.to_string()).into())
    }

    fn assign(&mut self, target: &Target, value: Value) -> Flow<()> {
        match target {
            Target::Name(name) => {
                self.variables.insert(name.clone(), value);
            }
            Target::Tuple(targets) => {
                let items = iterate(&value)?;
                if items.len() != targets.len() {
                    return Err(SandboxError::Value(format!(
                        "expected {} values to unpack, got {}",
                        targets.len(),
                        items.len()
                    ))
                    .into());
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
            }
            Target::Subscript { container, index } => {
                let index = self.eval(index)?;
                let slot = self
                    .variables
                    .get_mut(container)
                    .ok_or_else(|| SandboxError::Name(container.clone()))?;
                match (slot, &index) {
                    (Value::Object(map), Value::String(key)) => {
                        map.insert(key.clone(), value);
                    }
                    (Value::Array(items), index) => {
                        let position = list_position(items.len(), index)?;
                        items[position] = value;
                    }
                    (other, _) => {
                        return Err(SandboxError::Type(format!(
                            "'{}' object does not support item assignment with this key",
                            type_name(other)
                        ))
                        .into())
                    }
                }
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Flow<Value> {
        match expr {
            Expr::Const(value) => Ok(value.clone()),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) | Expr::Tuple(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::Array(values))
            }
            Expr::Dict(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    let key = match self.eval(key)? {
                        Value::String(s) => s,
                        other => {
                            return Err(SandboxError::Type(format!(
                                "dictionary keys must be str, not {}",
                                type_name(&other)
                            ))
                            .into())
                        }
                    };
                    let value = self.eval(value)?;
                    map.insert(key, value);
                }
                Ok(Value::Object(map))
            }
            Expr::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FPart::Literal(text) => out.push_str(text),
                        FPart::Hole { expr, conversion, spec } => {
                            let value = self.eval(expr)?;
                            let value = match conversion {
                                Some('r') => Value::String(repr_form(&value)),
                                Some('s') => Value::String(str_form(&value)),
                                _ => value,
                            };
                            out.push_str(&format_value(&value, spec.as_deref().unwrap_or(""))?);
                        }
                    }
                }
                Ok(Value::String(out))
            }
            Expr::ListComp { element, target, iter, conditions } => {
                let items = iterate(&self.eval(iter)?)?;
                let mut out = Vec::new();
                'items: for item in items {
                    self.tick()?;
                    self.assign(target, item)?;
                    for condition in conditions {
                        if !truthy(&self.eval(condition)?) {
                            continue 'items;
                        }
                    }
                    out.push(self.eval(element)?);
                }
                Ok(Value::Array(out))
            }
            Expr::Unary(op, operand) => {
                let operand = self.eval(operand)?;
                Ok(unary(*op, &operand)?)
            }
            Expr::Binary(left, op, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(binary(*op, &left, &right)?)
            }
            Expr::Compare(first, rest) => {
                let mut left = self.eval(first)?;
                for (op, right) in rest {
                    let right = self.eval(right)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if !truthy(&left) {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if truthy(&left) {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::IfElse { condition, then, otherwise } => {
                if truthy(&self.eval(condition)?) {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Call { function, args, kwargs } => {
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval(arg)?);
                }
                let mut kwarg_values = Vec::with_capacity(kwargs.len());
                for (name, arg) in kwargs {
                    kwarg_values.push((name.clone(), self.eval(arg)?));
                }
                self.call(function, arg_values, kwarg_values)
            }
            Expr::MethodCall { receiver, method, args } => {
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval(arg)?);
                }
                self.method(receiver, method, arg_values)
            }
            Expr::Subscript(container, index) => {
                let container = self.eval(container)?;
                let index = self.eval(index)?;
                Ok(subscript(&container, &index)?)
            }
            Expr::Slice(container, lower, upper) => {
                let container = self.eval(container)?;
                let lower = match lower {
                    Some(e) => Some(self.eval(e)?),
                    None => None,
                };
                let upper = match upper {
                    Some(e) => Some(self.eval(e)?),
                    None => None,
                };
                Ok(slice(&container, lower.as_ref(), upper.as_ref())?)
            }
        }
    }

    fn call(&mut self, function: &str, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Flow<Value> {
        if self.host.provides(function) {
            debug!(function, "dispatching host call");
            return match self.host.call(function, args, kwargs) {
                Ok(HostReply::Value(value)) => Ok(value),
                Ok(HostReply::Finish(value)) => Err(Signal::Finish(value)),
                Err(message) => Err(SandboxError::Host(message).into()),
            };
        }
        if BUILTINS.contains(&function) {
            return Ok(self.builtin(function, args, kwargs)?);
        }
        Err(SandboxError::Forbidden(function.to_string()).into())
    }

    fn builtin(
        &mut self,
        function: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, SandboxError> {
        let kwarg = |name: &str| kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone());
        if function != "print" && function != "sorted" && function != "sum" && function != "enumerate" {
            if let Some((name, _)) = kwargs.first() {
                return Err(SandboxError::Type(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    function, name
                )));
            }
        }

        match function {
            "print" => {
                let sep = kwarg("sep").map(|v| str_form(&v)).unwrap_or_else(|| " ".to_string());
                let end = kwarg("end").map(|v| str_form(&v)).unwrap_or_else(|| "\n".to_string());
                let line: Vec<String> = args.iter().map(str_form).collect();
                self.stdout.push_str(&line.join(&sep));
                self.stdout.push_str(&end);
                Ok(Value::Null)
            }
            "str" => Ok(Value::String(args.first().map(str_form).unwrap_or_default())),
            "repr" => Ok(Value::String(repr_form(&single(function, &args)?))),
            "len" => {
                let arg = single(function, &args)?;
                let len = match &arg {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Object(map) => map.len(),
                    other => {
                        return Err(SandboxError::Type(format!(
                            "object of type '{}' has no len()",
                            type_name(other)
                        )))
                    }
                };
                Ok(value::int(len as i64))
            }
            "int" => {
                let arg = single(function, &args)?;
                match &arg {
                    Value::String(s) => s.trim().parse::<i64>().map(value::int).map_err(|_| {
                        SandboxError::Value(format!("invalid literal for int() with base 10: {}", repr_form(&arg)))
                    }),
                    other => as_int(other)
                        .or_else(|| as_float(other).map(|f| f.trunc() as i64))
                        .map(value::int)
                        .ok_or_else(|| type_error("int", other)),
                }
            }
            "float" => {
                let arg = single(function, &args)?;
                match &arg {
                    Value::String(s) => s
                        .trim()
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(value::float)
                        .ok_or_else(|| {
                            SandboxError::Value(format!("could not convert string to float: {}", repr_form(&arg)))
                        }),
                    other => as_float(other).map(value::float).ok_or_else(|| type_error("float", other)),
                }
            }
            "bool" => Ok(Value::Bool(args.first().map(truthy).unwrap_or(false))),
            "round" => {
                let number = args.first().ok_or_else(|| missing(function))?;
                let x = as_float(number).ok_or_else(|| type_error("round", number))?;
                match args.get(1).and_then(as_int) {
                    None => {
                        if let Some(i) = as_int(number).filter(|_| !matches!(number, Value::Bool(_))) {
                            return Ok(value::int(i));
                        }
                        Ok(value::int(x.round_ties_even() as i64))
                    }
                    Some(digits) => {
                        let scale = 10f64.powi(digits as i32);
                        Ok(value::float((x * scale).round_ties_even() / scale))
                    }
                }
            }
            "abs" => {
                let arg = single(function, &args)?;
                if let Some(i) = as_int(&arg) {
                    return Ok(value::int(i.saturating_abs()));
                }
                as_float(&arg).map(|f| value::float(f.abs())).ok_or_else(|| type_error("abs", &arg))
            }
            "min" | "max" => {
                let items = if args.len() == 1 { iterate(&args[0])? } else { args };
                let mut best: Option<Value> = None;
                for item in items {
                    best = Some(match best {
                        None => item,
                        Some(current) => {
                            let ordering = value::compare(&item, &current).ok_or_else(|| {
                                SandboxError::Type(format!(
                                    "'<' not supported between instances of '{}' and '{}'",
                                    type_name(&item),
                                    type_name(&current)
                                ))
                            })?;
                            let replace = if function == "min" {
                                ordering.is_lt()
                            } else {
                                ordering.is_gt()
                            };
                            if replace {
                                item
                            } else {
                                current
                            }
                        }
                    });
                }
                best.ok_or_else(|| SandboxError::Value(format!("{}() arg is an empty sequence", function)))
            }
            "sum" => {
                let items = iterate(&single(function, &args)?)?;
                let mut total = kwarg("start").unwrap_or_else(|| value::int(0));
                for item in items {
                    total = binary(BinOp::Add, &total, &item)?;
                }
                Ok(total)
            }
            "sorted" => {
                let mut items = iterate(&single(function, &args)?)?;
                let mut failure = None;
                items.sort_by(|a, b| {
                    value::compare(a, b).unwrap_or_else(|| {
                        failure = Some(SandboxError::Type(format!(
                            "'<' not supported between instances of '{}' and '{}'",
                            type_name(a),
                            type_name(b)
                        )));
                        std::cmp::Ordering::Equal
                    })
                });
                if let Some(err) = failure {
                    return Err(err);
                }
                if kwarg("reverse").map(|v| truthy(&v)).unwrap_or(false) {
                    items.reverse();
                }
                Ok(Value::Array(items))
            }
            "list" => match args.first() {
                None => Ok(Value::Array(Vec::new())),
                Some(arg) => Ok(Value::Array(iterate(arg)?)),
            },
            "range" => {
                let bounds: Vec<i64> = args
                    .iter()
                    .map(|a| as_int(a).ok_or_else(|| type_error("range", a)))
                    .collect::<Result<_, _>>()?;
                let (start, stop, step) = match bounds.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => return Err(SandboxError::Type("range expected 1 to 3 arguments".into())),
                };
                if step == 0 {
                    return Err(SandboxError::Value("range() arg 3 must not be zero".into()));
                }
                // Every produced value lies between `start` and `stop`, so only
                // the span and count need the wider type.
                let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
                let span = if step > 0 { stop - start } else { start - stop };
                let count = if span <= 0 { 0 } else { (span - 1) / step.abs() + 1 };
                if count > i128::from(self.budget) {
                    return Err(SandboxError::Budget(self.budget));
                }
                Ok(Value::Array((0..count).map(|i| value::int((start + i * step) as i64)).collect()))
            }
            "enumerate" => {
                let items = iterate(&single(function, &args)?)?;
                let start = kwarg("start").and_then(|v| as_int(&v)).unwrap_or(0);
                let pairs = items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| {
                        i64::try_from(i)
                            .ok()
                            .and_then(|i| start.checked_add(i))
                            .map(|index| Value::Array(vec![value::int(index), item]))
                            .ok_or_else(|| SandboxError::Overflow("enumerate index out of range".into()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(pairs))
            }
            "zip" => {
                let columns: Vec<Vec<Value>> = args.iter().map(iterate).collect::<Result<_, _>>()?;
                let len = columns.iter().map(Vec::len).min().unwrap_or(0);
                Ok(Value::Array(
                    (0..len)
                        .map(|i| Value::Array(columns.iter().map(|c| c[i].clone()).collect()))
                        .collect(),
                ))
            }
            other => Err(SandboxError::Forbidden(other.to_string())),
        }
    }

    fn method(&mut self, receiver: &Expr, method: &str, args: Vec<Value>) -> Flow<Value> {
        // Mutating list methods write back into the named variable.
        if matches!(method, "append" | "extend" | "pop") {
            let Expr::Name(name) = receiver else {
                return Err(SandboxError::Type(format!("'.{}()' needs a named list", method)).into());
            };
            let slot = self
                .variables
                .get_mut(name)
                .ok_or_else(|| SandboxError::Name(name.clone()))?;
            let slot_type = type_name(slot);
            let Value::Array(items) = slot else {
                return Err(SandboxError::Attribute(format!(
                    "'{}' object has no attribute '{}'",
                    slot_type, method
                ))
                .into());
            };
            return Ok(match method {
                "append" => {
                    items.push(single(method, &args)?);
                    Value::Null
                }
                "extend" => {
                    items.extend(iterate(&single(method, &args)?)?);
                    Value::Null
                }
                _ => {
                    let position = match args.first() {
                        Some(index) => list_position(items.len(), index)?,
                        None if items.is_empty() => {
                            return Err(SandboxError::Index("pop from empty list".into()).into())
                        }
                        None => items.len() - 1,
                    };
                    items.remove(position)
                }
            });
        }

        let target = self.eval(receiver)?;
        Ok(pure_method(&target, method, &args)?)
    }
}

// ── Operators ────────────────────────────────────────────────────────────────

fn unary(op: UnaryOp, operand: &Value) -> Result<Value, SandboxError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!truthy(operand))),
        UnaryOp::Pos => as_float(operand)
            .map(|_| operand.clone())
            .ok_or_else(|| SandboxError::Type(format!("bad operand type for unary +: '{}'", type_name(operand)))),
        UnaryOp::Neg => {
            if let Some(i) = as_int(operand) {
                return Ok(i.checked_neg().map(value::int).unwrap_or_else(|| value::float(-(i as f64))));
            }
            as_float(operand)
                .map(|f| value::float(-f))
                .ok_or_else(|| SandboxError::Type(format!("bad operand type for unary -: '{}'", type_name(operand))))
        }
    }
}

fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, SandboxError> {
    if let (Some(a), Some(b)) = (as_int(left), as_int(right)) {
        return int_binary(op, a, b);
    }
    if let (Some(a), Some(b)) = (as_float(left), as_float(right)) {
        return float_binary(op, a, b);
    }

    match (op, left, right) {
        (BinOp::Add, Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
        (BinOp::Add, Value::Array(a), Value::Array(b)) => {
            Ok(Value::Array(a.iter().chain(b.iter()).cloned().collect()))
        }
        (BinOp::Mul, Value::String(s), n) | (BinOp::Mul, n, Value::String(s)) if as_int(n).is_some() => {
            let times = repeat_count(s.len(), as_int(n).unwrap_or(0))?;
            Ok(Value::String(s.repeat(times)))
        }
        (BinOp::Mul, Value::Array(items), n) | (BinOp::Mul, n, Value::Array(items)) if as_int(n).is_some() => {
            let times = repeat_count(items.len(), as_int(n).unwrap_or(0))?;
            Ok(Value::Array(
                std::iter::repeat(items.iter().cloned()).take(times).flatten().collect(),
            ))
        }
        _ => Err(SandboxError::Type(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            symbol(op),
            type_name(left),
            type_name(right)
        ))),
    }
}

fn int_binary(op: BinOp, a: i64, b: i64) -> Result<Value, SandboxError> {
    let checked = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => return float_binary(op, a as f64, b as f64),
        BinOp::FloorDiv | BinOp::Mod if b == 0 => return Err(SandboxError::ZeroDivision),
        BinOp::FloorDiv => a.checked_div(b).map(|quotient| {
            let remainder = a.wrapping_rem(b);
            if remainder != 0 && ((remainder < 0) != (b < 0)) {
                quotient - 1
            } else {
                quotient
            }
        }),
        BinOp::Mod => {
            let remainder = a.wrapping_rem(b);
            Some(if remainder != 0 && ((remainder < 0) != (b < 0)) { remainder + b } else { remainder })
        }
        BinOp::Pow if b < 0 => return float_binary(op, a as f64, b as f64),
        BinOp::Pow => u32::try_from(b).ok().and_then(|e| a.checked_pow(e)),
    };
    match checked {
        Some(result) => Ok(value::int(result)),
        None => float_binary(op, a as f64, b as f64),
    }
}

/// Number of copies for `sequence * n`, refusing results longer than
/// `MAX_SEQUENCE_LEN` elements.
fn repeat_count(len: usize, n: i64) -> Result<usize, SandboxError> {
    let times = usize::try_from(n.max(0)).unwrap_or(usize::MAX);
    match len.checked_mul(times) {
        Some(total) if total <= MAX_SEQUENCE_LEN => Ok(times),
        _ => Err(SandboxError::Overflow(format!(
            "repeated sequence would exceed {} elements",
            MAX_SEQUENCE_LEN
        ))),
    }
}

fn float_binary(op: BinOp, a: f64, b: f64) -> Result<Value, SandboxError> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if b == 0.0 => return Err(SandboxError::ZeroDivision),
        BinOp::Div => a / b,
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod => a - b * (a / b).floor(),
        BinOp::Pow => a.powf(b),
    };
    Ok(value::float(result))
}

fn symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, SandboxError> {
    let ordered = |accept: fn(std::cmp::Ordering) -> bool| {
        value::compare(left, right).map(accept).ok_or_else(|| {
            SandboxError::Type(format!(
                "comparison not supported between instances of '{}' and '{}'",
                type_name(left),
                type_name(right)
            ))
        })
    };
    match op {
        CmpOp::Eq | CmpOp::Is => Ok(value::equals(left, right)),
        CmpOp::NotEq | CmpOp::IsNot => Ok(!value::equals(left, right)),
        CmpOp::Lt => ordered(|o| o.is_lt()),
        CmpOp::LtE => ordered(|o| o.is_le()),
        CmpOp::Gt => ordered(|o| o.is_gt()),
        CmpOp::GtE => ordered(|o| o.is_ge()),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|found| !found),
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, SandboxError> {
    match (container, item) {
        (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Array(items), item) => Ok(items.iter().any(|v| value::equals(v, item))),
        (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
        (Value::Object(_), _) => Ok(false),
        (other, _) => Err(SandboxError::Type(format!(
            "argument of type '{}' is not iterable",
            type_name(other)
        ))),
    }
}

// ── Containers ───────────────────────────────────────────────────────────────

fn iterate(value: &Value) -> Result<Vec<Value>, SandboxError> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::Object(map) => Ok(map.keys().cloned().map(Value::String).collect()),
        other => Err(SandboxError::Type(format!("'{}' object is not iterable", type_name(other)))),
    }
}

fn list_position(len: usize, index: &Value) -> Result<usize, SandboxError> {
    let i = as_int(index).ok_or_else(|| {
        SandboxError::Type(format!("indices must be integers, not {}", type_name(index)))
    })?;
    let resolved = if i < 0 { len as i64 + i } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(SandboxError::Index("index out of range".into()));
    }
    Ok(resolved as usize)
}

fn subscript(container: &Value, index: &Value) -> Result<Value, SandboxError> {
    match container {
        Value::Array(items) => Ok(items[list_position(items.len(), index)?].clone()),
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::String(chars[list_position(chars.len(), index)?].to_string()))
        }
        Value::Object(map) => {
            let key = match index {
                Value::String(key) => key,
                other => return Err(SandboxError::Key(repr_form(other))),
            };
            map.get(key).cloned().ok_or_else(|| SandboxError::Key(repr_form(index)))
        }
        other => Err(SandboxError::Type(format!(
            "'{}' object is not subscriptable",
            type_name(other)
        ))),
    }
}

fn slice(container: &Value, lower: Option<&Value>, upper: Option<&Value>) -> Result<Value, SandboxError> {
    let bound = |bound: Option<&Value>, len: usize, default: usize| -> Result<usize, SandboxError> {
        match bound {
            None | Some(Value::Null) => Ok(default),
            Some(v) => {
                let i = as_int(v).ok_or_else(|| {
                    SandboxError::Type("slice indices must be integers or None".into())
                })?;
                let resolved = if i < 0 { len as i64 + i } else { i };
                Ok(resolved.clamp(0, len as i64) as usize)
            }
        }
    };
    match container {
        Value::Array(items) => {
            let start = bound(lower, items.len(), 0)?;
            let end = bound(upper, items.len(), items.len())?;
            Ok(Value::Array(items.get(start..end.max(start)).unwrap_or(&[]).to_vec()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let start = bound(lower, chars.len(), 0)?;
            let end = bound(upper, chars.len(), chars.len())?;
            Ok(Value::String(chars[start..end.max(start)].iter().collect()))
        }
        other => Err(SandboxError::Type(format!(
            "'{}' object is not subscriptable",
            type_name(other)
        ))),
    }
}

fn pure_method(target: &Value, method: &str, args: &[Value]) -> Result<Value, SandboxError> {
    let text_arg = |i: usize| -> Result<String, SandboxError> {
        match args.get(i) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(type_error(method, other)),
            None => Err(missing(method)),
        }
    };

    match (target, method) {
        (Value::String(s), "lower") => Ok(Value::String(s.to_lowercase())),
        (Value::String(s), "upper") => Ok(Value::String(s.to_uppercase())),
        (Value::String(s), "strip") => Ok(Value::String(s.trim().to_string())),
        (Value::String(s), "lstrip") => Ok(Value::String(s.trim_start().to_string())),
        (Value::String(s), "rstrip") => Ok(Value::String(s.trim_end().to_string())),
        (Value::String(s), "split") => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Null) => s.split_whitespace().map(|p| Value::String(p.into())).collect(),
                Some(_) => {
                    let sep = text_arg(0)?;
                    if sep.is_empty() {
                        return Err(SandboxError::Value("empty separator".into()));
                    }
                    s.split(sep.as_str()).map(|p| Value::String(p.into())).collect()
                }
            };
            Ok(Value::Array(parts))
        }
        (Value::String(s), "splitlines") => {
            Ok(Value::Array(s.lines().map(|l| Value::String(l.into())).collect()))
        }
        (Value::String(sep), "join") => {
            let items = iterate(args.first().ok_or_else(|| missing(method))?)?;
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => parts.push(s),
                    other => {
                        return Err(SandboxError::Type(format!(
                            "sequence item: expected str instance, {} found",
                            type_name(&other)
                        )))
                    }
                }
            }
            Ok(Value::String(parts.join(sep)))
        }
        (Value::String(s), "replace") => Ok(Value::String(s.replace(&text_arg(0)?, &text_arg(1)?))),
        (Value::String(s), "startswith") => Ok(Value::Bool(s.starts_with(&text_arg(0)?))),
        (Value::String(s), "endswith") => Ok(Value::Bool(s.ends_with(&text_arg(0)?))),
        (Value::String(s), "find") => {
            let needle = text_arg(0)?;
            Ok(value::int(
                s.find(&needle)
                    .map(|byte| s[..byte].chars().count() as i64)
                    .unwrap_or(-1),
            ))
        }
        (Value::Array(items), "index") => {
            let needle = args.first().ok_or_else(|| missing(method))?;
            items
                .iter()
                .position(|v| value::equals(v, needle))
                .map(|i| value::int(i as i64))
                .ok_or_else(|| SandboxError::Value(format!("{} is not in list", repr_form(needle))))
        }
        (Value::Array(items), "count") => {
            let needle = args.first().ok_or_else(|| missing(method))?;
            Ok(value::int(items.iter().filter(|v| value::equals(v, needle)).count() as i64))
        }
        (Value::Object(map), "get") => {
            let key = text_arg(0)?;
            Ok(map.get(&key).cloned().unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::Null)))
        }
        (Value::Object(map), "keys") => Ok(Value::Array(map.keys().cloned().map(Value::String).collect())),
        (Value::Object(map), "values") => Ok(Value::Array(map.values().cloned().collect())),
        (Value::Object(map), "items") => Ok(Value::Array(
            map.iter()
                .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                .collect(),
        )),
        (other, _) => Err(SandboxError::Attribute(format!(
            "'{}' object has no attribute '{}'",
            type_name(other),
            method
        ))),
    }
}

// ── Formatting ───────────────────────────────────────────────────────────────

/// Apply a `[[fill]align][width][,][.precision][type]` format spec.
fn format_value(value: &Value, spec: &str) -> Result<String, SandboxError> {
    if spec.is_empty() {
        return Ok(str_form(value));
    }

    let chars: Vec<char> = spec.chars().collect();
    let mut i = 0;
    let mut fill = ' ';
    let mut align = None;
    if chars.len() >= 2 && matches!(chars[1], '<' | '>' | '^') {
        fill = chars[0];
        align = Some(chars[1]);
        i = 2;
    } else if matches!(chars.first(), Some('<' | '>' | '^')) {
        align = Some(chars[0]);
        i = 1;
    }

    let width_start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    let width: usize = chars[width_start..i].iter().collect::<String>().parse().unwrap_or(0);

    let grouping = chars.get(i) == Some(&',');
    if grouping {
        i += 1;
    }

    let mut precision = None;
    if chars.get(i) == Some(&'.') {
        let start = i + 1;
        i = start;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        precision = chars[start..i].iter().collect::<String>().parse::<usize>().ok();
    }

    let kind = chars.get(i).copied();
    if i + usize::from(kind.is_some()) != chars.len() {
        return Err(SandboxError::Value(format!("invalid format specifier '{}'", spec)));
    }

    let body = match kind {
        Some('f') | Some('F') | Some('%') => {
            let mut x = as_float(value).ok_or_else(|| type_error("format", value))?;
            if kind == Some('%') {
                x *= 100.0;
            }
            let mut text = format!("{:.*}", precision.unwrap_or(6), x);
            if grouping {
                text = group_thousands(&text);
            }
            if kind == Some('%') {
                text.push('%');
            }
            text
        }
        Some('e') => {
            let x = as_float(value).ok_or_else(|| type_error("format", value))?;
            format!("{:.*e}", precision.unwrap_or(6), x)
        }
        Some('d') => {
            let n = as_int(value).ok_or_else(|| type_error("format", value))?;
            let text = n.to_string();
            if grouping {
                group_thousands(&text)
            } else {
                text
            }
        }
        Some('s') | None => {
            let text = str_form(value);
            match precision {
                Some(p) if matches!(value, Value::String(_)) => text.chars().take(p).collect(),
                Some(p) => match as_float(value) {
                    Some(x) => format!("{:.*}", p, x),
                    None => text,
                },
                None => text,
            }
        }
        Some(other) => {
            return Err(SandboxError::Value(format!("unknown format code '{}'", other)));
        }
    };

    let len = body.chars().count();
    if len >= width {
        return Ok(body);
    }
    let pad = width - len;
    let numeric = matches!(value, Value::Number(_));
    let padding = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
    Ok(match align.unwrap_or(if numeric { '>' } else { '<' }) {
        '>' => format!("{}{}", padding(pad), body),
        '^' => format!("{}{}{}", padding(pad / 2), body, padding(pad - pad / 2)),
        _ => format!("{}{}", body, padding(pad)),
    })
}

fn group_thousands(text: &str) -> String {
    let (sign, rest) = text.strip_prefix('-').map(|r| ("-", r)).unwrap_or(("", text));
    let (whole, fraction) = match rest.find('.') {
        Some(dot) => rest.split_at(dot),
        None => (rest, ""),
    };
    let digits: Vec<char> = whole.chars().collect();
    let mut grouped = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }
    format!("{}{}{}", sign, grouped, fraction)
}

// ── Argument helpers ─────────────────────────────────────────────────────────

fn single(function: &str, args: &[Value]) -> Result<Value, SandboxError> {
    match args {
        [arg] => Ok(arg.clone()),
        _ => Err(SandboxError::Type(format!(
            "{}() takes exactly one argument ({} given)",
            function,
            args.len()
        ))),
    }
}

fn missing(function: &str) -> SandboxError {
    SandboxError::Type(format!("{}() missing required argument", function))
}

fn type_error(function: &str, value: &Value) -> SandboxError {
    SandboxError::Type(format!(
        "{}() does not accept an argument of type '{}'",
        function,
        type_name(value)
    ))
}
