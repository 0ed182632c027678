use crate::diagnostic::Diagnostic;
use crate::source::SourceId;
use crate::span::{Span, Spanned};

use super::token::{is_ident_continue, is_ident_start, Lexeme};

/// What the raw scanner hands to the layout shaper: either a physical
/// token, or a single collapsed "line break" event standing for a run of
/// newlines plus the indentation whitespace of the line that follows them
/// (§4.1's LBEG). The shaper decides what, if anything, that implies.
pub(crate) enum Raw {
    Tok(Spanned<Lexeme>),
    LineBreak { indent: u32, span: Span },
}

pub(crate) struct Scanner<'src> {
    source: &'src [u8],
    file: SourceId,
    pos: usize,
    line: u32,
    col: u32,
    at_line_start: bool,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Scanner<'src> {
    pub(crate) fn new(source: &'src str, file: SourceId) -> Self {
        Self {
            source: source.as_bytes(),
            file,
            pos: 0,
            line: 1,
            col: 0,
            at_line_start: true,
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn here(&self) -> (usize, u32, u32) {
        (self.pos, self.line, self.col)
    }

    fn span_from(&self, start: (usize, u32, u32)) -> Span {
        Span::new(self.file, start.0 as u32, self.pos as u32, start.1, start.2)
    }

    /// Produce the next event: either a physical token, or a collapsed
    /// line-break event carrying the indent width of the next non-blank
    /// line (tabs expand to 4 columns, §4.1).
    pub(crate) fn next_raw(&mut self) -> Raw {
        if self.at_line_start && self.pos > 0 {
            // A token already triggered a newline; measure the run.
            return self.measure_indent_run();
        }
        self.at_line_start = false;
        self.skip_intraline_whitespace();

        if self.peek() == Some(b'\n') || self.peek() == Some(b'\r') {
            self.at_line_start = true;
            return self.measure_indent_run();
        }

        let start = self.here();
        let Some(ch) = self.peek() else {
            return Raw::Tok(Spanned::new(Lexeme::Eof, self.span_from(start)));
        };

        if is_ident_start(ch) {
            return Raw::Tok(self.scan_ident_or_keyword(start));
        }
        if ch.is_ascii_digit() {
            return Raw::Tok(self.scan_number(start));
        }
        if ch == b'"' || ch == b'\'' {
            return Raw::Tok(self.scan_string(start, ch));
        }
        if ch == b'#' {
            return Raw::Tok(self.scan_color(start));
        }
        Raw::Tok(self.scan_symbol(start))
    }

    fn measure_indent_run(&mut self) -> Raw {
        let start = self.here();
        loop {
            if self.peek() == Some(b'\r') {
                self.advance();
            }
            if self.peek() == Some(b'\n') {
                self.advance();
            }
            let mut width = 0u32;
            loop {
                match self.peek() {
                    Some(b' ') => {
                        width += 1;
                        self.advance();
                    }
                    Some(b'\t') => {
                        width += 4;
                        self.advance();
                    }
                    _ => break,
                }
            }
            match self.peek() {
                Some(b'\n') | Some(b'\r') => continue,
                _ => {
                    self.at_line_start = false;
                    return Raw::LineBreak {
                        indent: width,
                        span: self.span_from(start),
                    };
                }
            }
        }
    }

    fn skip_intraline_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.advance();
        }
    }

    fn scan_ident_or_keyword(&mut self, start: (usize, u32, u32)) -> Spanned<Lexeme> {
        while self.peek().map(is_ident_continue).unwrap_or(false) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.source[start.0..self.pos]).unwrap();
        let lexeme = match text {
            "true" => Lexeme::True,
            "false" => Lexeme::False,
            _ => Lexeme::from_keyword(text).unwrap_or_else(|| Lexeme::Ident(text.to_string())),
        };
        Spanned::new(lexeme, self.span_from(start))
    }

    fn scan_number(&mut self, start: (usize, u32, u32)) -> Spanned<Lexeme> {
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek2().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            is_float = true;
            self.advance();
            while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let save = self.pos;
            self.advance();
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.advance();
            }
            if self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                is_float = true;
                while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    self.advance();
                }
            } else {
                self.pos = save;
            }
        }
        let text = std::str::from_utf8(&self.source[start.0..self.pos]).unwrap();
        let lexeme = if is_float {
            Lexeme::Float(text.parse().unwrap_or(f64::NAN))
        } else {
            match text.parse::<i64>() {
                Ok(v) => Lexeme::Int(v),
                Err(_) => Lexeme::Float(text.parse().unwrap_or(f64::NAN)),
            }
        };
        Spanned::new(lexeme, self.span_from(start))
    }

    fn scan_string(&mut self, start: (usize, u32, u32), quote: u8) -> Spanned<Lexeme> {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    self.diagnostics.push(Diagnostic::error(
                        "unterminated string literal",
                        self.span_from(start),
                    ));
                    break;
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    if let Some(escaped) = self.advance() {
                        text.push(match escaped {
                            b'n' => '\n',
                            b't' => '\t',
                            other => other as char,
                        });
                    }
                }
                Some(_) => {
                    let ch_start = self.pos;
                    self.advance();
                    text.push(self.source[ch_start] as char);
                }
            }
        }
        Spanned::new(Lexeme::Str(text), self.span_from(start))
    }

    fn scan_color(&mut self, start: (usize, u32, u32)) -> Spanned<Lexeme> {
        self.advance(); // '#'
        let hex_start = self.pos;
        while self
            .peek()
            .map(|c| c.is_ascii_hexdigit())
            .unwrap_or(false)
        {
            self.advance();
        }
        let hex = std::str::from_utf8(&self.source[hex_start..self.pos]).unwrap();
        let parsed = match hex.len() {
            6 => u32::from_str_radix(hex, 16).ok().map(|v| {
                (
                    (v >> 16) as u8,
                    (v >> 8) as u8,
                    v as u8,
                    0xFF,
                )
            }),
            8 => u32::from_str_radix(hex, 16).ok().map(|v| {
                ((v >> 24) as u8, (v >> 16) as u8, (v >> 8) as u8, v as u8)
            }),
            _ => None,
        };
        let span = self.span_from(start);
        match parsed {
            Some((r, g, b, a)) => Spanned::new(Lexeme::Color(r, g, b, a), span),
            None => {
                self.diagnostics.push(Diagnostic::error(
                    "invalid color literal, expected #RRGGBB or #RRGGBBAA",
                    span,
                ));
                Spanned::new(Lexeme::Color(0, 0, 0, 0xFF), span)
            }
        }
    }

    fn scan_symbol(&mut self, start: (usize, u32, u32)) -> Spanned<Lexeme> {
        let ch = self.advance().unwrap();
        let lexeme = match ch {
            b'(' => Lexeme::LPar,
            b')' => Lexeme::RPar,
            b'[' => Lexeme::LSqBr,
            b']' => Lexeme::RSqBr,
            b',' => Lexeme::Comma,
            b'.' => Lexeme::Dot,
            b'?' => Lexeme::Question,
            b'+' => Lexeme::Plus,
            b'-' => Lexeme::Minus,
            b'*' => Lexeme::Star,
            b'/' => Lexeme::Slash,
            b'%' => Lexeme::Percent,
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    Lexeme::EqEq
                } else if self.peek() == Some(b'>') {
                    self.advance();
                    Lexeme::Arrow
                } else {
                    Lexeme::Define
                }
            }
            b':' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    Lexeme::Assign
                } else {
                    Lexeme::Colon
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    Lexeme::NotEq
                } else {
                    self.diagnostics.push(Diagnostic::error(
                        "unexpected character '!'",
                        self.span_from(start),
                    ));
                    Lexeme::NotEq
                }
            }
            b'<' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    Lexeme::LtEq
                } else {
                    Lexeme::Lt
                }
            }
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    Lexeme::GtEq
                } else {
                    Lexeme::Gt
                }
            }
            other => {
                self.diagnostics.push(Diagnostic::error(
                    format!("unexpected character {:?}", other as char),
                    self.span_from(start),
                ));
                // Synthesize a harmless token and keep scanning.
                Lexeme::Comma
            }
        };
        Spanned::new(lexeme, self.span_from(start))
    }
}
