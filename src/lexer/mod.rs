mod layout;
mod scanner;
mod token;

pub use token::Lexeme;

use crate::diagnostic::Diagnostic;
use crate::source::SourceId;
use crate::span::Spanned;

/// Tokenize `source` into the shaped token stream the parser consumes
/// (§4.1). Lexical warnings (mismatched dedent levels) are collected but
/// never stop tokenization.
pub fn tokenize(source: &str, file: SourceId) -> (Vec<Spanned<Lexeme>>, Vec<Diagnostic>) {
    layout::tokenize(source, file)
}
