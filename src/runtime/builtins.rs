//! Builtin function registry.
//!
//! FUNC is the only way bytecode reaches host code: it names a builtin and
//! how many arguments to pass. Builtins are registered by name up front; a
//! name that was never registered is a fatal [`RuntimeError::UnknownBuiltin`].

use std::collections::HashMap;
use std::io::Write;

use tracing::warn;

use crate::lang::value::Value;
use crate::runtime::runtime_error::RuntimeError;

/// Failure reported by a builtin.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct BuiltinError(pub String);

impl BuiltinError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Host function. Receives its arguments in declaration order and returns
/// exactly one value.
pub type BuiltinFn = Box<dyn FnMut(&[Value]) -> Result<Value, BuiltinError>>;

#[derive(Default)]
pub struct Builtins {
    table: HashMap<String, BuiltinFn>,
}

impl std::fmt::Debug for Builtins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builtins")
            .field("names", &self.names())
            .finish()
    }
}

impl Builtins {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard builtins, printing to stdout.
    pub fn standard() -> Self {
        Self::standard_with_output(std::io::stdout())
    }

    /// Standard builtins, printing to `out`.
    pub fn standard_with_output<W: Write + 'static>(mut out: W) -> Self {
        let mut builtins = Self::new();

        builtins.register("print", move |args| {
            let line: Vec<String> = args.iter().map(|v| v.to_string()).collect();
            writeln!(out, "{}", line.join(" ")).map_err(|e| BuiltinError::new(e.to_string()))?;
            Ok(Value::Nil)
        });

        builtins.register("abs", |args| match expect_args::<1>(args)? {
            [Value::Int(n)] => n
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| BuiltinError::new("integer overflow")),
            [Value::Float(n)] => Ok(Value::Float(n.abs())),
            [other] => Err(not_a_number(other)),
        });

        builtins.register("min", |args| extremum(args, |candidate, best| candidate < best));
        builtins.register("max", |args| extremum(args, |candidate, best| candidate > best));

        builtins.register("len", |args| match expect_args::<1>(args)? {
            [Value::Str(s)] => Ok(Value::Int(s.chars().count() as i64)),
            [other] => Err(BuiltinError::new(format!(
                "expected string, got {}",
                other.type_name()
            ))),
        });

        builtins.register("str", |args| {
            let [value] = expect_args::<1>(args)?;
            Ok(Value::Str(value.to_string()))
        });

        builtins
    }

    /// Register a builtin, replacing any previous one with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: FnMut(&[Value]) -> Result<Value, BuiltinError> + 'static,
    {
        self.table.insert(name.into(), Box::new(func));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.table.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let func = self
            .table
            .get_mut(name)
            .ok_or_else(|| RuntimeError::UnknownBuiltin {
                name: name.to_string(),
            })?;

        func(args).map_err(|e| {
            warn!(builtin = name, error = %e, "builtin failed");
            RuntimeError::Builtin {
                name: name.to_string(),
                message: e.0,
            }
        })
    }
}

fn expect_args<const N: usize>(args: &[Value]) -> Result<&[Value; N], BuiltinError> {
    args.try_into().map_err(|_| {
        BuiltinError::new(format!(
            "expected {} argument(s), got {}",
            N,
            args.len()
        ))
    })
}

fn not_a_number(value: &Value) -> BuiltinError {
    BuiltinError::new(format!("expected number, got {}", value.type_name()))
}

/// Pick the argument that wins `better` against every other, keeping its
/// original type.
fn extremum(args: &[Value], better: fn(f64, f64) -> bool) -> Result<Value, BuiltinError> {
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| BuiltinError::new("expected at least 1 argument"))?;

    let mut best = first;
    let mut best_n = first.as_f64().ok_or_else(|| not_a_number(first))?;

    for candidate in rest {
        let n = candidate.as_f64().ok_or_else(|| not_a_number(candidate))?;
        if better(n, best_n) {
            best = candidate;
            best_n = n;
        }
    }

    Ok(best.clone())
}
