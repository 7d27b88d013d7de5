//! Three-address-code data model.
//!
//! A compiled function body is a flat `Vec<Line>`; each line names a
//! destination, an opcode, and up to two operands. Absent operands are
//! `Value::Null`. The evaluator for these lives in the VM crate; this module
//! is only the shape of the code plus a disassembly form for debugging.

use std::fmt;

use crate::error::Location;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Noop,
    /// Store `a` at `lhs`.
    Assign,
    /// Statement-level result: store `a` at `lhs` and, in REPL mode, also
    /// bind `_` and echo through the implicit-output sink.
    AssignImplicit,
    /// Evaluate-copy: fresh list/map from a literal; plain `val` otherwise.
    Copy,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Equal,
    NotEqual,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    /// Prototype-chain membership test.
    Isa,
    /// Fuzzy AND: clamp01(a*b).
    And,
    /// Fuzzy OR: absClamp01(a + b - a*b).
    Or,
    /// Fuzzy NOT: 1 - absClamp01(a) for numbers, boolean negation otherwise.
    Not,
    /// Unconditional branch to line `a`.
    Jump,
    /// Branch if `b` is truthy (BoolValue).
    JumpIfTrue,
    /// Branch only if `b` truncates to a nonzero integer; lets short-circuit
    /// `or` skip strict zero without being fooled by a fuzzy 0.0001.
    JumpIfTruly,
    /// Branch if `b` is falsy or null.
    JumpIfFalse,
    /// Push `a` onto the pending-call argument stack.
    PushArg,
    /// Call function `a` with `b` pushed arguments; result lands at `lhs`.
    CallFunction,
    /// Invoke the intrinsic with id `a` (used inside intrinsic wrappers).
    CallIntrinsic,
    /// Evaluate `a`, pop the context, hand the value to the caller.
    Return,
    /// Member or index access: `a[b]` with the `__isa` walk on maps.
    Index,
    /// Like `Index`, but map access at ordinal `b` yields a one-shot
    /// `{"key": k, "value": v}` mini-map (the `for` loop's view).
    IndexIter,
    /// String length / list count / map count of `a`.
    Length,
    /// Set function `a`'s captured outer variables to the current locals.
    BindOuter,
}

impl Op {
    /// Binary-operator spelling for disassembly, if this op has one.
    fn symbol(self) -> Option<&'static str> {
        Some(match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::Pow => "^",
            Op::Equal => "==",
            Op::NotEqual => "!=",
            Op::Greater => ">",
            Op::GreaterEq => ">=",
            Op::Less => "<",
            Op::LessEq => "<=",
            Op::Isa => "isa",
            Op::And => "and",
            Op::Or => "or",
            _ => return None,
        })
    }
}

/// One TAC instruction: `lhs := a <op> b`, annotated with the 1-based source
/// line it came from.
#[derive(Clone)]
pub struct Line {
    pub lhs: Value,
    pub op: Op,
    pub a: Value,
    pub b: Value,
    pub location: Location,
}

impl Line {
    pub fn new(lhs: Value, op: Op, a: Value, b: Value) -> Self {
        Line {
            lhs,
            op,
            a,
            b,
            location: 0,
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sym) = self.op.symbol() {
            return write!(f, "{:?} := {:?} {} {:?}", self.lhs, self.a, sym, self.b);
        }
        match self.op {
            Op::Noop => write!(f, "noop"),
            Op::Assign => write!(f, "{:?} := {:?}", self.lhs, self.a),
            Op::AssignImplicit => write!(f, "_ := {:?}", self.a),
            Op::Copy => write!(f, "{:?} := copy {:?}", self.lhs, self.a),
            Op::Not => write!(f, "{:?} := not {:?}", self.lhs, self.a),
            Op::Jump => write!(f, "goto {:?}", self.a),
            Op::JumpIfTrue => write!(f, "goto {:?} if {:?}", self.a, self.b),
            Op::JumpIfTruly => write!(f, "goto {:?} if truly {:?}", self.a, self.b),
            Op::JumpIfFalse => write!(f, "goto {:?} if not {:?}", self.a, self.b),
            Op::PushArg => write!(f, "push param {:?}", self.a),
            Op::CallFunction => {
                write!(f, "{:?} := call {:?} with {:?} args", self.lhs, self.a, self.b)
            }
            Op::CallIntrinsic => write!(f, "{:?} := intrinsic {:?}", self.lhs, self.a),
            Op::Return => write!(f, "return {:?}", self.a),
            Op::Index => write!(f, "{:?} := {:?}[{:?}]", self.lhs, self.a, self.b),
            Op::IndexIter => write!(f, "{:?} := {:?} iter [{:?}]", self.lhs, self.a, self.b),
            Op::Length => write!(f, "{:?} := len({:?})", self.lhs, self.a),
            Op::BindOuter => write!(f, "bind {:?}", self.a),
            _ => unreachable!(),
        }
    }
}

impl fmt::Debug for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::intern;

    #[test]
    fn disassembly_reads_like_tac() {
        let line = Line::new(
            Value::Temp(0),
            Op::Add,
            Value::var(intern("x")),
            Value::Number(3.0),
        );
        assert_eq!(line.to_string(), "_0 := x + 3");

        let jump = Line::new(Value::Null, Op::Jump, Value::Number(12.0), Value::Null);
        assert_eq!(jump.to_string(), "goto 12");
    }

    #[test]
    fn location_annotation() {
        let line = Line::new(Value::Temp(1), Op::Noop, Value::Null, Value::Null).at(7);
        assert_eq!(line.location, 7);
    }
}
