//! The TAC virtual machine: call contexts, the per-opcode evaluator, the
//! `__isa` prototype resolver, and intrinsic dispatch.

#![allow(clippy::mutable_key_type)]

pub mod context;
pub mod eval;
pub mod intrinsic;
pub mod machine;
pub mod resolve;

pub use context::Context;
pub use eval::Binding;
pub use intrinsic::{Intrinsic, IntrinsicBuilder, IntrinsicFn, IntrinsicResult};
pub use machine::{Machine, MachineEnv, OutputSink, MAX_CALL_DEPTH};
pub use resolve::{lookup_member, value_is_a, Resolved};
