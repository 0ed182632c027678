//! A self-contained runtime for an indentation-sensitive scripting
//! language for technical-analysis indicators and trading strategies
//! over OHLCV bar data.
//!
//! The pipeline is tokenizer (`lexer`) → parser (`ast`/`parser`) →
//! validation (`lower`) → bar-execution runtime (`runtime`), with the
//! streaming technical-analysis engine (`ta`) called into from the
//! runtime's builtin dispatch. [`compile`] drives the first three
//! stages; [`runtime::Program::feed`] drives the fourth, one bar at a
//! time.

pub mod ast;
pub mod diagnostic;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod runtime;
pub mod source;
pub mod span;
pub mod ta;

pub use diagnostic::{render_diagnostics, Diagnostic};
pub use runtime::{compile, Bar, Context, Program, RuntimeError};
