//! Opcode handlers.
//!
//! Binary handlers pop the right operand first, then the left one: the left
//! operand was pushed first and sits deeper in the stack.

use std::cmp::Ordering;

use crate::bytecode::Operand;
use crate::lang::value::Value;
use crate::runtime::frame::Frame;
use crate::runtime::runtime_error::{RuntimeError, type_mismatch};
use crate::runtime::vm_bc::MachineState;

type HandlerResult = Result<(), RuntimeError>;

// =============================================================================
// Operand decoding
// =============================================================================

fn operand<'a>(
    state: &MachineState,
    operands: &'a [Operand],
    index: usize,
) -> Result<&'a Operand, RuntimeError> {
    operands
        .get(index)
        .ok_or_else(|| state.malformed(format!("missing operand {}", index)))
}

fn value_operand<'a>(
    state: &MachineState,
    operands: &'a [Operand],
) -> Result<&'a Value, RuntimeError> {
    match operand(state, operands, 0)? {
        Operand::Value(value) => Ok(value),
        other => Err(state.malformed(format!("expected value operand, found {}", other.kind()))),
    }
}

fn name_operand<'a>(
    state: &MachineState,
    operands: &'a [Operand],
) -> Result<&'a str, RuntimeError> {
    match operand(state, operands, 0)? {
        Operand::Name(name) => Ok(name),
        other => Err(state.malformed(format!("expected name operand, found {}", other.kind()))),
    }
}

fn address_operand(state: &MachineState, operands: &[Operand]) -> Result<usize, RuntimeError> {
    match operand(state, operands, 0)? {
        Operand::Address(address) => Ok(*address),
        other => Err(state.malformed(format!("expected address operand, found {}", other.kind()))),
    }
}

fn count_operand(state: &MachineState, operands: &[Operand]) -> Result<usize, RuntimeError> {
    match operand(state, operands, 1)? {
        Operand::Count(count) => Ok(*count),
        other => Err(state.malformed(format!("expected count operand, found {}", other.kind()))),
    }
}

fn pop_pair(state: &mut MachineState) -> Result<(Value, Value), RuntimeError> {
    let right = state.pop()?;
    let left = state.pop()?;
    Ok((left, right))
}

// =============================================================================
// Stack
// =============================================================================

pub fn halt(state: &mut MachineState, _: &[Operand]) -> HandlerResult {
    state.halt();
    Ok(())
}

/// `( -- x )`
pub fn push(state: &mut MachineState, operands: &[Operand]) -> HandlerResult {
    let value = value_operand(state, operands)?.clone();
    state.push(value)
}

/// `( x -- )`
pub fn pop(state: &mut MachineState, _: &[Operand]) -> HandlerResult {
    state.pop()?;
    Ok(())
}

/// `( x -- x x )`
pub fn dup(state: &mut MachineState, _: &[Operand]) -> HandlerResult {
    let top = state.pop()?;
    state.push(top.clone())?;
    state.push(top)
}

// =============================================================================
// Arithmetic
// =============================================================================

/// Int with Int stays Int (overflow is an error); any Float makes a Float.
fn arithmetic(
    state: &mut MachineState,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> HandlerResult {
    let (left, right) = pop_pair(state)?;
    push_arithmetic(state, left, right, int_op, float_op)
}

fn push_arithmetic(
    state: &mut MachineState,
    left: Value,
    right: Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> HandlerResult {
    let opcode = state.current_opcode();

    let result = match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => {
            Value::Int(int_op(*a, *b).ok_or(RuntimeError::IntegerOverflow { opcode })?)
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Value::Float(float_op(a, b)),
            _ => return Err(type_mismatch(opcode, &left, &right)),
        },
    };

    state.push(result)
}

/// `( a b -- a+b )`; two strings concatenate.
pub fn add(state: &mut MachineState, _: &[Operand]) -> HandlerResult {
    match pop_pair(state)? {
        (Value::Str(mut a), Value::Str(b)) => {
            a.push_str(&b);
            state.push(Value::Str(a))
        }
        (left, right) => push_arithmetic(state, left, right, i64::checked_add, |a, b| a + b),
    }
}

/// `( a b -- a-b )`
pub fn sub(state: &mut MachineState, _: &[Operand]) -> HandlerResult {
    arithmetic(state, i64::checked_sub, |a, b| a - b)
}

/// `( a b -- a*b )`
pub fn mul(state: &mut MachineState, _: &[Operand]) -> HandlerResult {
    arithmetic(state, i64::checked_mul, |a, b| a * b)
}

/// `( a b -- a/b )`; always produces a float.
pub fn div(state: &mut MachineState, _: &[Operand]) -> HandlerResult {
    let (left, right) = pop_pair(state)?;

    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(type_mismatch(state.current_opcode(), &left, &right));
    };
    if b == 0.0 {
        return Err(RuntimeError::DivisionByZero);
    }

    state.push(Value::Float(a / b))
}

// =============================================================================
// Logic
// =============================================================================

pub fn and(state: &mut MachineState, _: &[Operand]) -> HandlerResult {
    let (left, right) = pop_pair(state)?;
    state.push(Value::Bool(left.is_truthy() && right.is_truthy()))
}

pub fn or(state: &mut MachineState, _: &[Operand]) -> HandlerResult {
    let (left, right) = pop_pair(state)?;
    state.push(Value::Bool(left.is_truthy() || right.is_truthy()))
}

pub fn not(state: &mut MachineState, _: &[Operand]) -> HandlerResult {
    let value = state.pop()?;
    state.push(Value::Bool(!value.is_truthy()))
}

// =============================================================================
// Comparison
// =============================================================================

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            left.as_f64() == right.as_f64()
        }
        _ => left == right,
    }
}

/// `None` when the pair is unordered (NaN); an error when the types cannot
/// be ordered at all.
fn compare(
    state: &MachineState,
    left: &Value,
    right: &Value,
) -> Result<Option<Ordering>, RuntimeError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Some(a.cmp(b))),
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
            _ => Err(type_mismatch(state.current_opcode(), left, right)),
        },
    }
}

/// `( a b -- a==b )`
pub fn is_eq(state: &mut MachineState, _: &[Operand]) -> HandlerResult {
    let (left, right) = pop_pair(state)?;
    state.push(Value::Bool(values_equal(&left, &right)))
}

/// `( a b -- a>b )`
pub fn is_gt(state: &mut MachineState, _: &[Operand]) -> HandlerResult {
    let (left, right) = pop_pair(state)?;
    let ordering = compare(state, &left, &right)?;
    state.push(Value::Bool(ordering == Some(Ordering::Greater)))
}

/// `( a b -- a>=b )`
pub fn is_ge(state: &mut MachineState, _: &[Operand]) -> HandlerResult {
    let (left, right) = pop_pair(state)?;
    let ordering = compare(state, &left, &right)?;
    state.push(Value::Bool(matches!(
        ordering,
        Some(Ordering::Greater | Ordering::Equal)
    )))
}

// =============================================================================
// Control flow
// =============================================================================

pub fn jump(state: &mut MachineState, operands: &[Operand]) -> HandlerResult {
    let target = address_operand(state, operands)?;
    state.jump(target);
    Ok(())
}

/// Pops the condition; jumps only when it is truthy.
pub fn jump_if(state: &mut MachineState, operands: &[Operand]) -> HandlerResult {
    let target = address_operand(state, operands)?;
    if state.pop()?.is_truthy() {
        state.jump(target);
    }
    Ok(())
}

// =============================================================================
// Memory
// =============================================================================

pub fn load(state: &mut MachineState, operands: &[Operand]) -> HandlerResult {
    let name = name_operand(state, operands)?;
    let value = state
        .frame()
        .get(name)
        .cloned()
        .ok_or_else(|| RuntimeError::UnboundVariable {
            name: name.to_string(),
        })?;
    state.push(value)
}

pub fn store(state: &mut MachineState, operands: &[Operand]) -> HandlerResult {
    let name = name_operand(state, operands)?;
    let value = state.pop()?;
    state.frame_mut().set(name, value);
    Ok(())
}

// =============================================================================
// Calls
// =============================================================================

/// Push a frame returning to the instruction after the CALL, then jump.
pub fn call(state: &mut MachineState, operands: &[Operand]) -> HandlerResult {
    let target = address_operand(state, operands)?;
    let return_address = state.ip();
    state.push_frame(Frame::new(return_address))?;
    state.jump(target);
    Ok(())
}

pub fn ret(state: &mut MachineState, _: &[Operand]) -> HandlerResult {
    let frame = state.pop_frame()?;
    state.jump(frame.return_address());
    Ok(())
}

/// FUNC name argc: `( a1 .. an -- result )`
pub fn call_builtin(state: &mut MachineState, operands: &[Operand]) -> HandlerResult {
    let name = name_operand(state, operands)?;
    let argc = count_operand(state, operands)?;

    // popped last-first, handed over first-first
    let mut args = Vec::with_capacity(argc);
    for _ in 0..argc {
        args.push(state.pop()?);
    }
    args.reverse();

    let result = state.builtins_mut().call(name, &args)?;
    state.push(result)
}
