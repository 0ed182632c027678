use crate::ast::*;
use crate::diagnostic::Diagnostic;
use crate::lexer::Lexeme;
use crate::span::{Span, Spanned};

const MAX_NESTING_DEPTH: u32 = 256;

pub struct Parser {
    tokens: Vec<Spanned<Lexeme>>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
    depth: u32,
}

/// Parse a shaped token stream into a [`Script`]. Never panics on malformed
/// input: on an unexpected token the parser records `(line, column,
/// message)`, recovers to the next statement boundary, and keeps going
/// (§4.2). The full diagnostic list is returned on failure, not just the
/// first error.
pub fn parse(tokens: Vec<Spanned<Lexeme>>) -> Result<Script, Vec<Diagnostic>> {
    let mut parser = Parser::new(tokens);
    let stmts = parser.parse_top_level();
    if parser.diagnostics.is_empty() {
        Ok(Script { stmts })
    } else {
        Err(parser.diagnostics)
    }
}

impl Parser {
    fn new(tokens: Vec<Spanned<Lexeme>>) -> Self {
        Self {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
            depth: 0,
        }
    }

    // ---- token stream primitives ----

    fn cur(&self) -> &Spanned<Lexeme> {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_after_lends(&self) -> &Lexeme {
        let mut i = self.pos;
        while i < self.tokens.len() && matches!(self.tokens[i].node, Lexeme::Lend) {
            i += 1;
        }
        &self.tokens[i.min(self.tokens.len() - 1)].node
    }

    fn at(&self, want: &Lexeme) -> bool {
        std::mem::discriminant(&self.cur().node) == std::mem::discriminant(want)
    }

    fn advance(&mut self) -> Spanned<Lexeme> {
        let tok = self.cur().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, want: &Lexeme) -> bool {
        if self.at(want) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, want: &Lexeme) -> Span {
        if self.at(want) {
            self.advance().span
        } else {
            let span = self.cur().span;
            self.push_error(format!(
                "expected {}, found {}",
                want.description(),
                self.cur().node.description()
            ));
            span
        }
    }

    fn expect_ident(&mut self) -> Spanned<String> {
        if let Lexeme::Ident(name) = self.cur().node.clone() {
            let span = self.cur().span;
            self.advance();
            Spanned::new(name, span)
        } else {
            let span = self.cur().span;
            self.push_error(format!(
                "expected identifier, found {}",
                self.cur().node.description()
            ));
            Spanned::new("<error>".to_string(), span)
        }
    }

    fn push_error(&mut self, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(message, self.cur().span));
        self.recover();
    }

    fn recover(&mut self) {
        while !self.at(&Lexeme::Lend) && !self.at(&Lexeme::End) && !self.at(&Lexeme::Eof) {
            self.advance();
        }
    }

    fn enter_nesting(&mut self) -> bool {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.push_error("expression nesting exceeded 256 levels");
            return false;
        }
        true
    }

    fn exit_nesting(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn skip_lends(&mut self) {
        while self.eat(&Lexeme::Lend) {}
    }

    // ---- statements ----

    fn parse_top_level(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        self.skip_lends();
        while !self.at(&Lexeme::Eof) {
            stmts.extend(self.parse_logical_line());
            self.skip_lends();
        }
        stmts
    }

    fn parse_block(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        self.skip_lends();
        while !self.at(&Lexeme::End) && !self.at(&Lexeme::Eof) {
            stmts.extend(self.parse_logical_line());
            self.skip_lends();
        }
        stmts
    }

    /// One or more statements separated by commas on the same logical line.
    fn parse_logical_line(&mut self) -> Vec<Stmt> {
        let mut stmts = vec![self.parse_statement()];
        while self.eat(&Lexeme::Comma) {
            stmts.push(self.parse_statement());
        }
        stmts
    }

    fn parse_statement(&mut self) -> Stmt {
        match &self.cur().node {
            Lexeme::Break => {
                let span = self.advance().span;
                Stmt::Break(span)
            }
            Lexeme::Continue => {
                let span = self.advance().span;
                Stmt::Continue(span)
            }
            Lexeme::LSqBr => self.parse_destructure(),
            Lexeme::Ident(_) if self.peek2_is(&Lexeme::Define) => self.parse_vardef(),
            Lexeme::Ident(_) if self.peek2_is(&Lexeme::Assign) => self.parse_assign(),
            Lexeme::Ident(_) if self.peek2_is(&Lexeme::LPar) => self.parse_ident_paren_stmt(),
            _ => Stmt::Expr(self.parse_expr()),
        }
    }

    fn peek2_is(&self, want: &Lexeme) -> bool {
        self.tokens
            .get(self.pos + 1)
            .map(|t| std::mem::discriminant(&t.node) == std::mem::discriminant(want))
            .unwrap_or(false)
    }

    fn parse_destructure(&mut self) -> Stmt {
        self.expect(&Lexeme::LSqBr);
        let mut names = Vec::new();
        if !self.at(&Lexeme::RSqBr) {
            names.push(self.expect_ident());
            while self.eat(&Lexeme::Comma) {
                names.push(self.expect_ident());
            }
        }
        self.expect(&Lexeme::RSqBr);
        self.expect(&Lexeme::Define);
        let expr = self.parse_expr();
        Stmt::Destructure { names, expr }
    }

    fn parse_vardef(&mut self) -> Stmt {
        let name = self.expect_ident();
        self.expect(&Lexeme::Define);
        let expr = self.parse_expr();
        Stmt::VarDef { name, expr }
    }

    fn parse_assign(&mut self) -> Stmt {
        let name = self.expect_ident();
        self.expect(&Lexeme::Assign);
        let expr = self.parse_expr();
        Stmt::Assign { name, expr }
    }

    /// Disambiguates `name(...)` between a function definition (single- or
    /// multi-line) and a call-expression statement, per §4.2.
    fn parse_ident_paren_stmt(&mut self) -> Stmt {
        let (path, name_span) = self.parse_ident_path();
        let (positional, keyword) = self.parse_call_args();

        if self.eat(&Lexeme::Arrow) {
            let params = self.params_from_call(&path, name_span, &positional, &keyword);
            let mut exprs = vec![self.parse_expr()];
            while self.eat(&Lexeme::Comma) {
                exprs.push(self.parse_expr());
            }
            let span = name_span.merge(exprs.last().unwrap().span);
            return Stmt::FuncDef(FuncDef {
                name: Spanned::new(path.join("."), name_span),
                params,
                body: FuncBody::Single(exprs),
                span,
            });
        }

        if matches!(self.peek_after_lends(), Lexeme::Begin) {
            let params = self.params_from_call(&path, name_span, &positional, &keyword);
            self.skip_lends();
            self.expect(&Lexeme::Begin);
            let body = self.parse_block();
            let end_span = self.expect(&Lexeme::End);
            return Stmt::FuncDef(FuncDef {
                name: Spanned::new(path.join("."), name_span),
                params,
                body: FuncBody::Block(body),
                span: name_span.merge(end_span),
            });
        }

        let call_span = positional
            .last()
            .map(|e| name_span.merge(e.span))
            .unwrap_or(name_span);
        Stmt::Expr(Expr::new(
            ExprKind::Call {
                callee: path,
                callee_span: name_span,
                positional,
                keyword,
            },
            call_span,
        ))
    }

    fn params_from_call(
        &mut self,
        path: &[String],
        name_span: Span,
        positional: &[Expr],
        keyword: &[(Spanned<String>, Expr)],
    ) -> Vec<Spanned<String>> {
        if path.len() != 1 {
            self.diagnostics.push(Diagnostic::error(
                "function names cannot be dotted",
                name_span,
            ));
        }
        if !keyword.is_empty() {
            self.diagnostics.push(Diagnostic::error(
                "function parameter list cannot contain keyword arguments",
                name_span,
            ));
        }
        let mut params = Vec::new();
        for expr in positional {
            if let ExprKind::Ident(segs) = &expr.kind {
                if segs.len() == 1 {
                    params.push(Spanned::new(segs[0].clone(), expr.span));
                    continue;
                }
            }
            self.diagnostics
                .push(Diagnostic::error("expected a plain parameter name", expr.span));
        }
        params
    }

    // ---- expressions, by precedence (lowest to highest) ----

    pub(crate) fn parse_expr(&mut self) -> Expr {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Expr {
        let cond = self.parse_or();
        if self.eat(&Lexeme::Question) {
            let then_expr = self.parse_ternary();
            self.expect(&Lexeme::Colon);
            let else_expr = self.parse_ternary();
            let span = cond.span.merge(else_expr.span);
            Expr::new(
                ExprKind::Ternary {
                    cond: Box::new(cond),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                },
                span,
            )
        } else {
            cond
        }
    }

    fn parse_or(&mut self) -> Expr {
        let mut lhs = self.parse_and();
        while self.eat(&Lexeme::Or) {
            let rhs = self.parse_and();
            lhs = self.binary(BinaryOp::Or, lhs, rhs);
        }
        lhs
    }

    fn parse_and(&mut self) -> Expr {
        let mut lhs = self.parse_eq();
        while self.eat(&Lexeme::And) {
            let rhs = self.parse_eq();
            lhs = self.binary(BinaryOp::And, lhs, rhs);
        }
        lhs
    }

    fn parse_eq(&mut self) -> Expr {
        let mut lhs = self.parse_cmp();
        loop {
            let op = if self.eat(&Lexeme::EqEq) {
                BinaryOp::Eq
            } else if self.eat(&Lexeme::NotEq) {
                BinaryOp::NotEq
            } else {
                break;
            };
            let rhs = self.parse_cmp();
            lhs = self.binary(op, lhs, rhs);
        }
        lhs
    }

    fn parse_cmp(&mut self) -> Expr {
        let mut lhs = self.parse_add();
        loop {
            let op = if self.eat(&Lexeme::Lt) {
                BinaryOp::Lt
            } else if self.eat(&Lexeme::LtEq) {
                BinaryOp::LtEq
            } else if self.eat(&Lexeme::Gt) {
                BinaryOp::Gt
            } else if self.eat(&Lexeme::GtEq) {
                BinaryOp::GtEq
            } else {
                break;
            };
            let rhs = self.parse_add();
            lhs = self.binary(op, lhs, rhs);
        }
        lhs
    }

    fn parse_add(&mut self) -> Expr {
        let mut lhs = self.parse_mul();
        loop {
            let op = if self.eat(&Lexeme::Plus) {
                BinaryOp::Add
            } else if self.eat(&Lexeme::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_mul();
            lhs = self.binary(op, lhs, rhs);
        }
        lhs
    }

    fn parse_mul(&mut self) -> Expr {
        let mut lhs = self.parse_unary();
        loop {
            let op = if self.eat(&Lexeme::Star) {
                BinaryOp::Mul
            } else if self.eat(&Lexeme::Slash) {
                BinaryOp::Div
            } else if self.eat(&Lexeme::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };
            let rhs = self.parse_unary();
            lhs = self.binary(op, lhs, rhs);
        }
        lhs
    }

    fn binary(&self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        let span = lhs.span.merge(rhs.span);
        Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        )
    }

    fn parse_unary(&mut self) -> Expr {
        if self.at(&Lexeme::Not) {
            let span = self.advance().span;
            let e = self.parse_unary();
            let full = span.merge(e.span);
            return Expr::new(ExprKind::Unary { op: UnaryOp::Not, expr: Box::new(e) }, full);
        }
        if self.at(&Lexeme::Minus) {
            let span = self.advance().span;
            let e = self.parse_unary();
            let full = span.merge(e.span);
            return Expr::new(ExprKind::Unary { op: UnaryOp::Neg, expr: Box::new(e) }, full);
        }
        if self.at(&Lexeme::Plus) {
            let span = self.advance().span;
            let e = self.parse_unary();
            let full = span.merge(e.span);
            return Expr::new(ExprKind::Unary { op: UnaryOp::Plus, expr: Box::new(e) }, full);
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut e = self.parse_atom();
        while self.at(&Lexeme::LSqBr) {
            self.advance();
            let index = self.parse_expr();
            let end = self.expect(&Lexeme::RSqBr);
            let span = e.span.merge(end);
            e = Expr::new(ExprKind::Subscript { base: Box::new(e), index: Box::new(index) }, span);
        }
        e
    }

    fn parse_atom(&mut self) -> Expr {
        if !self.enter_nesting() {
            let span = self.cur().span;
            self.exit_nesting();
            return Expr::new(ExprKind::Literal(Literal::Float(f64::NAN)), span);
        }
        let result = self.parse_atom_inner();
        self.exit_nesting();
        result
    }

    fn parse_atom_inner(&mut self) -> Expr {
        let span = self.cur().span;
        match self.cur().node.clone() {
            Lexeme::Int(v) => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Int(v)), span)
            }
            Lexeme::Float(v) => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Float(v)), span)
            }
            Lexeme::Str(s) => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Str(s)), span)
            }
            Lexeme::True => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Bool(true)), span)
            }
            Lexeme::False => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Bool(false)), span)
            }
            Lexeme::Color(r, g, b, a) => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Color(r, g, b, a)), span)
            }
            Lexeme::LPar => {
                self.advance();
                let inner = self.parse_expr();
                self.expect(&Lexeme::RPar);
                inner
            }
            Lexeme::LSqBr => {
                self.advance();
                let mut elements = Vec::new();
                if !self.at(&Lexeme::RSqBr) {
                    elements.push(self.parse_expr());
                    while self.eat(&Lexeme::Comma) {
                        elements.push(self.parse_expr());
                    }
                }
                let end = self.expect(&Lexeme::RSqBr);
                Expr::new(ExprKind::Array(elements), span.merge(end))
            }
            Lexeme::If => self.parse_if_expr(),
            Lexeme::For => self.parse_for_expr(),
            Lexeme::Ident(_) => {
                let (path, path_span) = self.parse_ident_path();
                if self.at(&Lexeme::LPar) {
                    let (positional, keyword) = self.parse_call_args();
                    let end = positional
                        .last()
                        .map(|e| e.span)
                        .or_else(|| keyword.last().map(|(_, e)| e.span))
                        .unwrap_or(path_span);
                    Expr::new(
                        ExprKind::Call {
                            callee: path,
                            callee_span: path_span,
                            positional,
                            keyword,
                        },
                        path_span.merge(end),
                    )
                } else {
                    Expr::new(ExprKind::Ident(path), path_span)
                }
            }
            _ => {
                self.push_error(format!("unexpected token {}", self.cur().node.description()));
                Expr::new(ExprKind::Literal(Literal::Float(f64::NAN)), span)
            }
        }
    }

    fn parse_ident_path(&mut self) -> (Vec<String>, Span) {
        let first = self.expect_ident();
        let mut span = first.span;
        let mut path = vec![first.node];
        while self.at(&Lexeme::Dot) {
            self.advance();
            let next = self.expect_ident();
            span = span.merge(next.span);
            path.push(next.node);
        }
        (path, span)
    }

    fn parse_call_args(&mut self) -> (Vec<Expr>, Vec<(Spanned<String>, Expr)>) {
        self.expect(&Lexeme::LPar);
        let mut positional = Vec::new();
        let mut keyword: Vec<(Spanned<String>, Expr)> = Vec::new();
        if !self.at(&Lexeme::RPar) {
            loop {
                if matches!(self.cur().node, Lexeme::Ident(_)) && self.peek2_is(&Lexeme::Define) {
                    let name = self.expect_ident();
                    self.expect(&Lexeme::Define);
                    let expr = self.parse_expr();
                    keyword.push((name, expr));
                } else {
                    if !keyword.is_empty() {
                        self.diagnostics.push(Diagnostic::error(
                            "positional argument follows a keyword argument",
                            self.cur().span,
                        ));
                    }
                    positional.push(self.parse_expr());
                }
                if !self.eat(&Lexeme::Comma) {
                    break;
                }
            }
        }
        self.expect(&Lexeme::RPar);
        (positional, keyword)
    }

    fn parse_if_expr(&mut self) -> Expr {
        let start = self.expect(&Lexeme::If);
        let cond = self.parse_expr();
        self.skip_lends();
        self.expect(&Lexeme::Begin);
        let then_block = self.parse_block();
        let mut end = self.expect(&Lexeme::End);

        let mut else_block = None;
        let save = self.pos;
        self.skip_lends();
        if self.eat(&Lexeme::Else) {
            self.skip_lends();
            self.expect(&Lexeme::Begin);
            let block = self.parse_block();
            end = self.expect(&Lexeme::End);
            else_block = Some(block);
        } else {
            self.pos = save;
        }

        Expr::new(
            ExprKind::If {
                cond: Box::new(cond),
                then_block,
                else_block,
            },
            start.merge(end),
        )
    }

    fn parse_for_expr(&mut self) -> Expr {
        let start = self.expect(&Lexeme::For);
        let var = self.expect_ident();
        self.expect(&Lexeme::Define);
        let from = self.parse_expr();
        self.expect(&Lexeme::To);
        let to = self.parse_expr();
        let step = if self.eat(&Lexeme::By) {
            Some(Box::new(self.parse_expr()))
        } else {
            None
        };
        self.skip_lends();
        self.expect(&Lexeme::Begin);
        let body = self.parse_block();
        let end = self.expect(&Lexeme::End);

        Expr::new(
            ExprKind::For {
                var,
                start: Box::new(from),
                end: Box::new(to),
                step,
                body,
            },
            start.merge(end),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::source::SourceId;

    fn parse_ok(src: &str) -> Script {
        let (tokens, lex_diags) = tokenize(src, SourceId(0));
        assert!(lex_diags.is_empty(), "lex errors: {:?}", lex_diags);
        parse(tokens).expect("parse should succeed")
    }

    #[test]
    fn parses_vardef_with_precedence() {
        let script = parse_ok("x = 1 + 2 * 3\n");
        assert_eq!(script.stmts.len(), 1);
        match &script.stmts[0] {
            Stmt::VarDef { name, expr } => {
                assert_eq!(name.node, "x");
                match &expr.kind {
                    ExprKind::Binary { op: BinaryOp::Add, rhs, .. } => {
                        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_single_line_function() {
        let script = parse_ok("double(n) => n * 2\ny = double(10)\n");
        assert_eq!(script.stmts.len(), 2);
        assert!(matches!(script.stmts[0], Stmt::FuncDef(_)));
    }

    #[test]
    fn parses_destructuring() {
        let script = parse_ok("[a, b] = pair()\n");
        match &script.stmts[0] {
            Stmt::Destructure { names, .. } => {
                assert_eq!(names.len(), 2);
                assert_eq!(names[0].node, "a");
                assert_eq!(names[1].node, "b");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_if_else_block() {
        let src = "if close > 100\n    plot(1, \"signal\")\nelse\n    plot(0, \"signal\")\n";
        let script = parse_ok(src);
        assert_eq!(script.stmts.len(), 1);
        assert!(matches!(
            &script.stmts[0],
            Stmt::Expr(Expr { kind: ExprKind::If { else_block: Some(_), .. }, .. })
        ));
    }

    #[test]
    fn parses_for_loop() {
        let src = "for i = 0 to 10 by 2\n    x := x + i\n";
        let script = parse_ok(src);
        assert!(matches!(
            &script.stmts[0],
            Stmt::Expr(Expr { kind: ExprKind::For { .. }, .. })
        ));
    }

    #[test]
    fn reports_diagnostics_without_panicking() {
        let (tokens, _) = tokenize("x = \n", SourceId(0));
        let result = parse(tokens);
        assert!(result.is_err());
    }

    #[test]
    fn keyword_args_after_positional() {
        let script = parse_ok("y = bb(close, length=20, mult=2)\n");
        match &script.stmts[0] {
            Stmt::VarDef { expr, .. } => match &expr.kind {
                ExprKind::Call { positional, keyword, .. } => {
                    assert_eq!(positional.len(), 1);
                    assert_eq!(keyword.len(), 2);
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }
}
