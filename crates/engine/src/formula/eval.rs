// Formula evaluator - computes a numeric result for an expression tree
// against a value lookup (the grid). Pure: the only effect is the returned
// value; the caller stores results and errors.

use std::fmt;

use crate::coord::Coord;

use super::parser::{Expr, Func, Op};
use super::refs::range_coords;

/// The capability the evaluator needs from the grid: the current numeric
/// value of a cell. Empty cells are 0.0; text cells and formulas without a
/// computed value are errors.
pub trait CellLookup {
    fn value(&self, coord: Coord) -> Result<f64, EvalError>;
}

/// Why evaluating a formula (or reading a cell during evaluation) failed.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    DivisionByZero,
    /// MIN/MAX/AVERAGE over an empty argument list.
    EmptyArguments(Func),
    /// The referenced cell's formula has not produced a value.
    UnevaluatedReference(Coord),
    /// The referenced cell holds text where a number is needed.
    TypeMismatch(Coord),
    /// A range used anywhere but as a direct function argument.
    RangeOutsideFunction,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::DivisionByZero => write!(f, "division by zero"),
            EvalError::EmptyArguments(func) => {
                write!(f, "{}() needs at least one argument", func)
            }
            EvalError::UnevaluatedReference(coord) => {
                write!(f, "cell {} has no computed value", coord)
            }
            EvalError::TypeMismatch(coord) => {
                write!(f, "cell {} holds text, not a number", coord)
            }
            EvalError::RangeOutsideFunction => {
                write!(f, "a range is only valid as a function argument")
            }
        }
    }
}

impl std::error::Error for EvalError {}

/// Work items for the iterative walk.
enum Task<'a> {
    /// Evaluate a sub-expression, leaving its value on the value stack.
    Visit(&'a Expr),
    /// Evaluate a function argument: like `Visit`, but a range is legal and
    /// expands to one value per covered cell.
    VisitArg(&'a Expr),
    /// Pop two values and apply a binary operator.
    Apply(Op),
    /// Pop every value above `base` and apply an aggregate.
    Call { func: Func, base: usize },
}

/// Evaluate a formula tree against `lookup`.
///
/// The walk is iterative over explicit work and value stacks, so deeply
/// nested or operator-heavy formulas cannot exhaust the call stack.
pub fn evaluate<L: CellLookup + ?Sized>(expr: &Expr, lookup: &L) -> Result<f64, EvalError> {
    let mut work = vec![Task::Visit(expr)];
    let mut values: Vec<f64> = Vec::new();

    while let Some(task) = work.pop() {
        match task {
            Task::Visit(node) => match node {
                Expr::Number(n) => values.push(*n),
                Expr::CellRef(coord) => values.push(lookup.value(*coord)?),
                Expr::Range(..) => return Err(EvalError::RangeOutsideFunction),
                Expr::BinaryOp { op, left, right } => {
                    work.push(Task::Apply(*op));
                    work.push(Task::Visit(right));
                    work.push(Task::Visit(left));
                }
                Expr::Function { func, args } => {
                    work.push(Task::Call {
                        func: *func,
                        base: values.len(),
                    });
                    // Reversed so arguments evaluate left to right.
                    for arg in args.iter().rev() {
                        work.push(Task::VisitArg(arg));
                    }
                }
            },
            Task::VisitArg(node) => match node {
                Expr::Range(start, end) => {
                    for coord in range_coords(*start, *end) {
                        values.push(lookup.value(coord)?);
                    }
                }
                other => work.push(Task::Visit(other)),
            },
            Task::Apply(op) => {
                let right = values.pop().unwrap();
                let left = values.pop().unwrap();
                values.push(apply_op(op, left, right)?);
            }
            Task::Call { func, base } => {
                let args = values.split_off(base);
                values.push(apply_func(func, &args)?);
            }
        }
    }

    Ok(values.pop().unwrap())
}

fn apply_op(op: Op, left: f64, right: f64) -> Result<f64, EvalError> {
    match op {
        Op::Add => Ok(left + right),
        Op::Sub => Ok(left - right),
        Op::Mul => Ok(left * right),
        Op::Div => {
            if right == 0.0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(left / right)
            }
        }
        Op::Mod => {
            if right == 0.0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(left % right)
            }
        }
    }
}

fn apply_func(func: Func, args: &[f64]) -> Result<f64, EvalError> {
    match func {
        Func::Sum => Ok(args.iter().sum()),
        Func::Min => args
            .iter()
            .copied()
            .reduce(f64::min)
            .ok_or(EvalError::EmptyArguments(func)),
        Func::Max => args
            .iter()
            .copied()
            .reduce(f64::max)
            .ok_or(EvalError::EmptyArguments(func)),
        Func::Average => {
            if args.is_empty() {
                Err(EvalError::EmptyArguments(func))
            } else {
                Ok(args.iter().sum::<f64>() / args.len() as f64)
            }
        }
    }
}
