//! Core data model for the MiniScript runtime: the uniform `Value`, the
//! insertion-ordered map, identifier interning, storage pooling, the TAC
//! instruction shape, and the error taxonomy.

#![allow(clippy::mutable_key_type)]

pub mod error;
pub mod intern;
pub mod map;
pub mod pool;
pub mod tac;
pub mod value;

pub use error::{Location, MsError};
pub use intern::{intern, resolve, with_resolved};
pub use lasso::Spur;
pub use map::VarMap;
pub use tac::{Line, Op};
pub use value::{
    format_number, ArithOp, CustomValue, FuncDef, FuncValue, Param, SeqElem, Value, VarRef,
    MAX_ISA_DEPTH, MAX_SEQUENCE_SIZE, MAX_STRUCTURAL_DEPTH,
};
