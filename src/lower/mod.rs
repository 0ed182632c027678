//! C3: the tree-walking transpiler. This pass never produces a separate
//! bytecode representation (explicitly out of scope, §2) — it validates
//! the parsed [`Script`](crate::ast::Script) against scoping and call-arity
//! rules and packages it, together with the user function table, into a
//! [`BarProcedure`] that C4 walks directly every bar.

use std::collections::{HashMap, HashSet};

use crate::ast::{Expr, ExprKind, FuncBody, FuncDef, Script, Stmt};
use crate::diagnostic::Diagnostic;
use crate::runtime::stdlib;

/// A validated script plus its resolved user-defined functions, ready for
/// repeated per-bar execution (§4.2, §4.3).
pub struct BarProcedure {
    pub script: Script,
    pub functions: HashMap<String, FuncDef>,
}

struct Resolver {
    scopes: Vec<HashSet<String>>,
    functions: HashMap<String, FuncDef>,
    diagnostics: Vec<Diagnostic>,
}

impl Resolver {
    fn new() -> Self {
        Self {
            scopes: vec![HashSet::new()],
            functions: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashSet::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str) {
        self.scopes.last_mut().unwrap().insert(name.to_string());
    }

    fn is_declared(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.contains(name))
    }

    fn is_declared_in_current_scope(&self, name: &str) -> bool {
        self.scopes.last().unwrap().contains(name)
    }

    fn collect_funcdefs(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            if let Stmt::FuncDef(f) = stmt {
                if self.functions.contains_key(&f.name.node) {
                    self.diagnostics.push(Diagnostic::error(
                        format!("function '{}' is defined more than once", f.name.node),
                        f.name.span,
                    ));
                } else {
                    self.functions.insert(f.name.node.clone(), f.clone());
                }
                self.declare(&f.name.node);
            }
        }
    }

    fn resolve_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.resolve_stmt(stmt);
        }
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDef { name, expr } => {
                self.resolve_expr(expr);
                if self.is_declared_in_current_scope(&name.node) {
                    self.diagnostics.push(Diagnostic::error(
                        format!("'{}' is already defined", name.node),
                        name.span,
                    ));
                }
                self.declare(&name.node);
            }
            Stmt::Assign { name, expr } => {
                self.resolve_expr(expr);
                if !self.is_declared(&name.node) {
                    self.diagnostics.push(Diagnostic::error(
                        format!("assignment to undefined variable '{}'", name.node),
                        name.span,
                    ));
                }
            }
            Stmt::Destructure { names, expr } => {
                self.resolve_expr(expr);
                for name in names {
                    self.declare(&name.node);
                }
            }
            Stmt::FuncDef(f) => self.resolve_funcdef(f),
            Stmt::Expr(expr) => self.resolve_expr(expr),
            Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }

    fn resolve_funcdef(&mut self, f: &FuncDef) {
        self.push_scope();
        for param in &f.params {
            self.declare(&param.node);
        }
        match &f.body {
            FuncBody::Single(exprs) => {
                for expr in exprs {
                    self.resolve_expr(expr);
                }
            }
            FuncBody::Block(stmts) => self.resolve_stmts(stmts),
        }
        self.pop_scope();
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Ident(path) => {
                if path.len() == 1 && !self.is_declared(&path[0]) && !self.is_known_reader(&path[0])
                {
                    self.diagnostics.push(Diagnostic::error(
                        format!("undefined identifier '{}'", path[0]),
                        expr.span,
                    ));
                }
            }
            ExprKind::Array(items) => {
                for item in items {
                    self.resolve_expr(item);
                }
            }
            ExprKind::Unary { expr: inner, .. } => self.resolve_expr(inner),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.resolve_expr(lhs);
                self.resolve_expr(rhs);
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.resolve_expr(cond);
                self.resolve_expr(then_expr);
                self.resolve_expr(else_expr);
            }
            ExprKind::Subscript { base, index } => {
                self.resolve_expr(base);
                self.resolve_expr(index);
            }
            ExprKind::Call {
                callee,
                callee_span,
                positional,
                keyword,
            } => {
                for arg in positional {
                    self.resolve_expr(arg);
                }
                for (_, arg) in keyword {
                    self.resolve_expr(arg);
                }
                self.validate_call(callee, *callee_span, positional.len(), keyword);
            }
            ExprKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.resolve_expr(cond);
                self.push_scope();
                self.resolve_stmts(then_block);
                self.pop_scope();
                if let Some(else_block) = else_block {
                    self.push_scope();
                    self.resolve_stmts(else_block);
                    self.pop_scope();
                }
            }
            ExprKind::For {
                var,
                start,
                end,
                step,
                body,
            } => {
                self.resolve_expr(start);
                self.resolve_expr(end);
                if let Some(step) = step {
                    self.resolve_expr(step);
                }
                self.push_scope();
                self.declare(&var.node);
                self.resolve_stmts(body);
                self.pop_scope();
            }
        }
    }

    /// Bare names with no declaration that are nonetheless readable: the
    /// OHLCV series and the running bar index (§3's implicit context).
    fn is_known_reader(&self, name: &str) -> bool {
        matches!(
            name,
            "open" | "high" | "low" | "close" | "volume" | "time" | "bar_index"
        )
    }

    fn validate_call(
        &mut self,
        callee: &[String],
        callee_span: crate::span::Span,
        positional: usize,
        keyword: &[(crate::span::Spanned<String>, Expr)],
    ) {
        let joined = callee.join(".");

        if callee.len() == 1 {
            if let Some(func) = self.functions.get(&joined) {
                let arity = func.params.len();
                if positional + keyword.len() > arity {
                    self.diagnostics.push(Diagnostic::error(
                        format!(
                            "'{}' takes {} argument(s) but {} were given",
                            joined,
                            arity,
                            positional + keyword.len()
                        ),
                        callee_span,
                    ));
                }
                for (kw_name, _) in keyword {
                    if !func.params.iter().any(|p| p.node == kw_name.node) {
                        self.diagnostics.push(Diagnostic::error(
                            format!("'{}' has no parameter named '{}'", joined, kw_name.node),
                            kw_name.span,
                        ));
                    }
                }
                return;
            }
        }

        match stdlib::lookup(&joined) {
            Some(spec) => {
                let total = positional + keyword.len();
                if total < spec.min_arity() || total > spec.max_arity() {
                    self.diagnostics.push(Diagnostic::error(
                        format!(
                            "'{}' expects {}..={} argument(s), got {}",
                            joined,
                            spec.min_arity(),
                            spec.max_arity(),
                            total
                        ),
                        callee_span,
                    ));
                }
                for (kw_name, _) in keyword {
                    if spec.param_index(&kw_name.node).is_none() {
                        self.diagnostics.push(Diagnostic::error(
                            format!("'{}' has no parameter named '{}'", joined, kw_name.node),
                            kw_name.span,
                        ));
                    }
                }
            }
            None => {
                self.diagnostics.push(Diagnostic::error(
                    format!("call to undefined function '{}'", joined),
                    callee_span,
                ));
            }
        }
    }
}

/// Validate `script` and package it into a [`BarProcedure`], or return the
/// collected diagnostics if validation failed (§7 — compile phases collect
/// rather than throw).
pub fn resolve(script: Script) -> Result<BarProcedure, Vec<Diagnostic>> {
    let mut resolver = Resolver::new();
    resolver.collect_funcdefs(&script.stmts);
    resolver.resolve_stmts(&script.stmts);

    if resolver
        .diagnostics
        .iter()
        .any(|d| d.severity == crate::diagnostic::Severity::Error)
    {
        return Err(resolver.diagnostics);
    }

    Ok(BarProcedure {
        script,
        functions: resolver.functions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::parser;
    use crate::source::SourceId;

    fn resolve_source(src: &str) -> Result<BarProcedure, Vec<Diagnostic>> {
        let (tokens, _) = lexer::tokenize(src, SourceId(0));
        let script = parser::parse(tokens).expect("parses");
        resolve(script)
    }

    #[test]
    fn valid_script_resolves() {
        let result = resolve_source("plot(sma(close, 20))\n");
        assert!(result.is_ok());
    }

    #[test]
    fn assignment_to_undefined_variable_is_an_error() {
        let result = resolve_source("x := 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_builtin_is_an_error() {
        let result = resolve_source("frobnicate(close)\n");
        assert!(result.is_err());
    }

    #[test]
    fn too_many_arguments_is_an_error() {
        let result = resolve_source("sma(close, 20, 30, 40)\n");
        assert!(result.is_err());
    }

    #[test]
    fn user_function_call_validated_against_its_own_arity() {
        let result = resolve_source("f(x) => x + 1\nf(1, 2)\n");
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_variable_definition_is_an_error() {
        let result = resolve_source("x = 1\nx = 2\n");
        assert!(result.is_err());
    }
}
