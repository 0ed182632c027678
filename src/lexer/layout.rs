use crate::diagnostic::Diagnostic;
use crate::source::SourceId;
use crate::span::Spanned;

use super::scanner::{Raw, Scanner};
use super::token::Lexeme;

/// Shapes the raw scan into the final token stream by tracking an
/// indentation stack and synthesizing virtual BEGIN/END/LEND tokens
/// (§4.1). Parenthesis/bracket nesting suppresses layout shaping entirely,
/// which is what lets multi-line calls and array literals work.
pub fn tokenize(source: &str, file: SourceId) -> (Vec<Spanned<Lexeme>>, Vec<Diagnostic>) {
    let mut scanner = Scanner::new(source, file);
    let mut out = Vec::new();
    let mut diagnostics = Vec::new();
    let mut indent_stack: Vec<u32> = vec![0];
    let mut paren_depth: i32 = 0;

    loop {
        match scanner.next_raw() {
            Raw::LineBreak { indent, span } => {
                if paren_depth > 0 {
                    continue;
                }
                let top = *indent_stack.last().unwrap();
                if indent > top {
                    indent_stack.push(indent);
                    out.push(Spanned::new(Lexeme::Begin, span));
                } else if indent < top {
                    out.push(Spanned::new(Lexeme::Lend, span));
                    while *indent_stack.last().unwrap() > indent {
                        indent_stack.pop();
                        out.push(Spanned::new(Lexeme::End, span));
                    }
                    if *indent_stack.last().unwrap() == indent {
                        out.push(Spanned::new(Lexeme::Lend, span));
                    } else {
                        diagnostics.push(Diagnostic::warning(
                            format!(
                                "indentation of {} columns does not match any enclosing block; continuing at {} columns",
                                indent,
                                indent_stack.last().unwrap()
                            ),
                            span,
                        ));
                    }
                } else {
                    out.push(Spanned::new(Lexeme::Lend, span));
                }
            }
            Raw::Tok(tok) => {
                match &tok.node {
                    Lexeme::LPar | Lexeme::LSqBr => paren_depth += 1,
                    Lexeme::RPar | Lexeme::RSqBr => paren_depth = (paren_depth - 1).max(0),
                    Lexeme::Eof => {
                        let needs_lend = !matches!(
                            out.last().map(|t| &t.node),
                            None | Some(Lexeme::Lend) | Some(Lexeme::Begin)
                        );
                        if needs_lend {
                            out.push(Spanned::new(Lexeme::Lend, tok.span));
                        }
                        while indent_stack.len() > 1 {
                            indent_stack.pop();
                            out.push(Spanned::new(Lexeme::End, tok.span));
                        }
                        out.push(tok);
                        diagnostics.extend(scanner.into_diagnostics());
                        return (out, diagnostics);
                    }
                    _ => {}
                }
                out.push(tok);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Lexeme> {
        tokenize(source, SourceId(0)).0.into_iter().map(|t| t.node).collect()
    }

    #[test]
    fn indent_stack_balances_to_zero() {
        let src = "x = 1\nif x\n    y = 2\n    z = 3\nw = 4\n";
        let toks = tokenize(src, SourceId(0));
        assert!(toks.1.is_empty());
        let begins = toks.0.iter().filter(|t| t.node == Lexeme::Begin).count();
        let ends = toks.0.iter().filter(|t| t.node == Lexeme::End).count();
        assert_eq!(begins, ends);
        assert_eq!(toks.0.last().unwrap().node, Lexeme::Eof);
    }

    #[test]
    fn simple_assignment_has_no_layout_tokens_besides_lend() {
        let ks = kinds("x = 1\n");
        assert!(matches!(ks[0], Lexeme::Ident(_)));
        assert_eq!(ks[1], Lexeme::Define);
        assert_eq!(ks[2], Lexeme::Int(1));
        assert!(ks.contains(&Lexeme::Lend));
        assert_eq!(*ks.last().unwrap(), Lexeme::Eof);
    }

    #[test]
    fn parens_suppress_layout() {
        let src = "y = f(\n    1,\n    2\n)\n";
        let ks = kinds(src);
        assert!(!ks.contains(&Lexeme::Begin));
        assert!(!ks.contains(&Lexeme::End));
    }

    #[test]
    fn dedent_to_outer_level_emits_extra_lend() {
        let src = "if a\n    if b\n        x = 1\n    y = 2\n";
        let ks = kinds(src);
        let lend_count = ks.iter().filter(|k| **k == Lexeme::Lend).count();
        assert!(lend_count >= 2);
    }
}
