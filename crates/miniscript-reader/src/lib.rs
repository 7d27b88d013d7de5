//! Source-to-TAC compiler: a line-oriented lexer and a single-pass
//! recursive-descent parser that emits TAC directly (no AST).

pub mod lexer;
pub mod parser;

pub use lexer::{tokenize, Keyword, SpannedToken, Token};
pub use parser::{compile, needs_more_input};
