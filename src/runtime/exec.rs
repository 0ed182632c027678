//! C4: the bar-execution runtime. `compile` turns source text into a
//! [`Program`]; `feed` (or the lower-level `execute_bar`) walks the
//! resolved script once per bar against a caller-owned [`Context`],
//! calling into C5's persistent-state table and C6's streaming
//! indicators as the tree-walk reaches each call site.

use std::collections::HashMap;

use crate::ast::{BinaryOp, Expr, ExprKind, FuncBody, Script, Stmt, UnaryOp};
use crate::diagnostic::Diagnostic;
use crate::lower::{self, BarProcedure};
use crate::span::Span;
use crate::ta::{derived, EmaState, ExtremaState, SmaState, VarianceState, WmaState};

use super::context::{Bar, Context};
use super::error::RuntimeError;
use super::stdlib::{self, BuiltinSpec};
use super::strategy::Direction;
use super::value::Value;

/// A validated, ready-to-run script (§4.2). Cheap to hold across many
/// bars: all the expensive per-bar state lives in the [`Context`] passed
/// to `feed`, not here.
pub struct Program {
    procedure: BarProcedure,
}

/// Parse, resolve, and package `source` into a runnable [`Program`], or
/// return the collected diagnostics (§7). Tokenizer warnings are folded
/// into the same list rather than failing compilation on their own.
pub fn compile(source: &str) -> Result<Program, Vec<Diagnostic>> {
    tracing::debug!(bytes = source.len(), "compiling script");
    let file = crate::source::SourceId(0);
    let (tokens, lex_diagnostics) = crate::lexer::tokenize(source, file);
    let script = crate::parser::parse(tokens).map_err(|mut parse_diagnostics| {
        let mut all = lex_diagnostics.clone();
        all.append(&mut parse_diagnostics);
        all
    })?;

    let procedure = lower::resolve(script).map_err(|mut resolve_diagnostics| {
        let mut all = lex_diagnostics.clone();
        all.append(&mut resolve_diagnostics);
        all
    })?;

    Ok(Program { procedure })
}

impl Program {
    /// Apply `bar` to `ctx` and run the script once (§4.4): reset the
    /// call counter, walk every top-level statement, then finalize plots
    /// and advance the bar index.
    pub fn feed(&self, ctx: &mut Context, bar: Bar) -> Result<(), RuntimeError> {
        tracing::trace!(bar_index = ctx.bar_index, time = bar.time, "feeding bar");
        ctx.apply_bar(bar);
        self.execute_bar(ctx)?;
        ctx.plots.finalize_bar();
        ctx.bar_index += 1;
        Ok(())
    }

    /// Run the script against `ctx`'s already-applied bar data without
    /// touching the bar index or finalizing plots — exposed for callers
    /// that manage those themselves (§4.4).
    pub fn execute_bar(&self, ctx: &mut Context) -> Result<(), RuntimeError> {
        ctx.state.reset_call_counter();
        let mut eval = Evaluator {
            ctx,
            functions: &self.procedure.functions,
            env: vec![HashMap::new()],
        };
        eval.exec_stmts(&self.procedure.script.stmts)?;
        Ok(())
    }

    pub fn script(&self) -> &Script {
        &self.procedure.script
    }
}

enum Flow {
    Normal,
    Break,
    Continue,
}

struct Evaluator<'a> {
    ctx: &'a mut Context,
    functions: &'a HashMap<String, crate::ast::FuncDef>,
    /// Lexical scopes for local variables, innermost last. A plain
    /// `VarDef` lives only in this stack — it is recomputed fresh every
    /// bar. Only indicator call sites persist across bars, via C5.
    env: Vec<HashMap<String, Value>>,
}

type EvalResult = Result<(Flow, Value), RuntimeError>;

impl<'a> Evaluator<'a> {
    fn push_scope(&mut self) {
        self.env.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.env.pop();
    }

    fn declare(&mut self, name: &str, value: Value) {
        self.env.last_mut().unwrap().insert(name.to_string(), value);
    }

    /// Write to an already-declared variable, searching outward through
    /// enclosing scopes (`total := total + i` inside a `for` body must
    /// reach the `total` declared outside the loop).
    fn assign(&mut self, name: &str, value: Value) {
        for scope in self.env.iter_mut().rev() {
            if scope.contains_key(name) {
                scope.insert(name.to_string(), value);
                return;
            }
        }
        self.declare(name, value);
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        self.env
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }

    fn exec_stmts(&mut self, stmts: &[Stmt]) -> Result<(Flow, Value), RuntimeError> {
        let mut last = Value::Number(f64::NAN);
        for stmt in stmts {
            let (flow, value) = self.exec_stmt(stmt)?;
            last = value;
            match flow {
                Flow::Normal => {}
                other => return Ok((other, last)),
            }
        }
        Ok((Flow::Normal, last))
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> EvalResult {
        match stmt {
            Stmt::VarDef { name, expr } => {
                let value = self.eval_expr(expr)?;
                self.declare(&name.node, value.clone());
                Ok((Flow::Normal, value))
            }
            Stmt::Assign { name, expr } => {
                let value = self.eval_expr(expr)?;
                self.assign(&name.node, value.clone());
                Ok((Flow::Normal, value))
            }
            Stmt::Destructure { names, expr } => {
                let value = self.eval_expr(expr)?;
                let items = match &value {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                for (i, name) in names.iter().enumerate() {
                    let v = items.get(i).cloned().unwrap_or(Value::Number(f64::NAN));
                    self.declare(&name.node, v);
                }
                Ok((Flow::Normal, value))
            }
            Stmt::FuncDef(_) => Ok((Flow::Normal, Value::Number(f64::NAN))),
            Stmt::Expr(expr) => {
                let value = self.eval_expr(expr)?;
                Ok((Flow::Normal, value))
            }
            Stmt::Break(_) => Ok((Flow::Break, Value::Number(f64::NAN))),
            Stmt::Continue(_) => Ok((Flow::Continue, Value::Number(f64::NAN))),
        }
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(Value::from(lit)),
            ExprKind::Ident(path) => {
                if path.len() == 1 {
                    if let Some(value) = self.lookup(&path[0]) {
                        return Ok(value);
                    }
                }
                Ok(self.read_ident(path))
            }
            ExprKind::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(item)?);
                }
                Ok(Value::Array(values))
            }
            ExprKind::Unary { op, expr } => {
                let value = self.eval_expr(expr)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-value.as_number()),
                    UnaryOp::Plus => Value::Number(value.as_number()),
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                })
            }
            ExprKind::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                if self.eval_expr(cond)?.truthy() {
                    self.eval_expr(then_expr)
                } else {
                    self.eval_expr(else_expr)
                }
            }
            ExprKind::Subscript { base, index } => {
                let base = self.eval_expr(base)?;
                let index = self.eval_expr(index)?.as_number() as i64;
                Ok(match base {
                    Value::Array(items) => {
                        if index >= 0 && (index as usize) < items.len() {
                            items[index as usize].clone()
                        } else {
                            Value::Number(f64::NAN)
                        }
                    }
                    _ => Value::Number(f64::NAN),
                })
            }
            ExprKind::Call {
                callee,
                callee_span,
                positional,
                keyword,
            } => self.eval_call(callee, *callee_span, positional, keyword),
            ExprKind::If {
                cond,
                then_block,
                else_block,
            } => {
                if self.eval_expr(cond)?.truthy() {
                    self.push_scope();
                    let result = self.exec_stmts(then_block);
                    self.pop_scope();
                    result.map(|(_, value)| value)
                } else if let Some(else_block) = else_block {
                    self.push_scope();
                    let result = self.exec_stmts(else_block);
                    self.pop_scope();
                    result.map(|(_, value)| value)
                } else {
                    Ok(Value::Number(f64::NAN))
                }
            }
            ExprKind::For {
                var,
                start,
                end,
                step,
                body,
            } => self.eval_for(&var.node, start, end, step.as_deref(), body),
        }
    }

    fn eval_for(
        &mut self,
        var: &str,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        body: &[Stmt],
    ) -> Result<Value, RuntimeError> {
        let start_n = self.eval_expr(start)?.as_number();
        let end_n = self.eval_expr(end)?.as_number();
        let step_n = match step {
            Some(step) => self.eval_expr(step)?.as_number(),
            None => {
                if end_n >= start_n {
                    1.0
                } else {
                    -1.0
                }
            }
        };

        let mut last = Value::Number(f64::NAN);
        if step_n == 0.0 {
            return Ok(last);
        }

        self.push_scope();
        let mut i = start_n;
        let result = loop {
            if step_n > 0.0 && i > end_n {
                break Ok(last);
            }
            if step_n < 0.0 && i < end_n {
                break Ok(last);
            }
            self.declare(var, Value::Number(i));
            match self.exec_stmts(body) {
                Ok((flow, value)) => {
                    last = value;
                    if matches!(flow, Flow::Break) {
                        break Ok(last);
                    }
                }
                Err(e) => break Err(e),
            }
            i += step_n;
        };
        self.pop_scope();
        result
    }

    fn eval_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Value, RuntimeError> {
        if op == BinaryOp::And {
            let l = self.eval_expr(lhs)?;
            if !l.truthy() {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(self.eval_expr(rhs)?.truthy()));
        }
        if op == BinaryOp::Or {
            let l = self.eval_expr(lhs)?;
            if l.truthy() {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(self.eval_expr(rhs)?.truthy()));
        }

        let l = self.eval_expr(lhs)?;
        let r = self.eval_expr(rhs)?;
        let a = l.as_number();
        let b = r.as_number();
        Ok(match op {
            BinaryOp::Eq => Value::Bool(a == b),
            BinaryOp::NotEq => Value::Bool(a != b),
            BinaryOp::Lt => Value::Bool(a < b),
            BinaryOp::LtEq => Value::Bool(a <= b),
            BinaryOp::Gt => Value::Bool(a > b),
            BinaryOp::GtEq => Value::Bool(a >= b),
            BinaryOp::Add => Value::Number(a + b),
            BinaryOp::Sub => Value::Number(a - b),
            BinaryOp::Mul => Value::Number(a * b),
            BinaryOp::Div => Value::Number(a / b),
            BinaryOp::Mod => Value::Number(a % b),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        })
    }

    fn read_ident(&self, path: &[String]) -> Value {
        match path.first().map(String::as_str) {
            Some("open") => Value::Number(self.ctx.open),
            Some("high") => Value::Number(self.ctx.high),
            Some("low") => Value::Number(self.ctx.low),
            Some("close") => Value::Number(self.ctx.close),
            Some("volume") => Value::Number(self.ctx.volume),
            Some("time") => Value::Number(self.ctx.time as f64),
            Some("bar_index") => Value::Number(self.ctx.bar_index as f64),
            _ => Value::Number(f64::NAN),
        }
    }

    fn eval_call(
        &mut self,
        callee: &[String],
        callee_span: Span,
        positional: &[Expr],
        keyword: &[(crate::span::Spanned<String>, Expr)],
    ) -> Result<Value, RuntimeError> {
        let joined = callee.join(".");

        let mut positional_values = Vec::with_capacity(positional.len());
        for arg in positional {
            positional_values.push(self.eval_expr(arg)?);
        }
        let mut keyword_values = Vec::with_capacity(keyword.len());
        for (name, arg) in keyword {
            keyword_values.push((name.node.clone(), self.eval_expr(arg)?));
        }

        if callee.len() == 1 {
            if let Some(func) = self.functions.get(&joined).cloned() {
                return self.call_user_function(&func, &positional_values, &keyword_values);
            }
        }

        match stdlib::lookup(&joined) {
            Some(spec) => {
                let args = bind_args(spec, &positional_values, &keyword_values);
                self.dispatch_builtin(&joined, callee_span, &args)
            }
            None => Err(RuntimeError::UnknownBuiltin {
                name: joined,
                call_site: callee_span,
            }),
        }
    }

    fn call_user_function(
        &mut self,
        func: &crate::ast::FuncDef,
        positional: &[Value],
        keyword: &[(String, Value)],
    ) -> Result<Value, RuntimeError> {
        let params: Vec<&str> = func.params.iter().map(|p| p.node.as_str()).collect();
        let mut bound = vec![Value::Number(f64::NAN); params.len()];
        for (i, v) in positional.iter().enumerate() {
            if i < bound.len() {
                bound[i] = v.clone();
            }
        }
        for (name, v) in keyword {
            if let Some(i) = params.iter().position(|p| p == name) {
                bound[i] = v.clone();
            }
        }

        self.push_scope();
        for (name, value) in params.iter().zip(bound.into_iter()) {
            self.declare(name, value);
        }

        let result = match &func.body {
            FuncBody::Single(exprs) => {
                let mut last = Value::Number(f64::NAN);
                for expr in exprs {
                    last = self.eval_expr(expr)?;
                }
                Ok(last)
            }
            FuncBody::Block(stmts) => self.exec_stmts(stmts).map(|(_, v)| v),
        };

        self.pop_scope();
        result
    }

    fn dispatch_builtin(
        &mut self,
        name: &str,
        call_site: Span,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let bar_index = self.ctx.bar_index;
        let state = &mut self.ctx.state;

        match name {
            "sma" => {
                let source = args[0].as_number();
                let length = args[1].as_number() as i64;
                let out = state
                    .get_or_init_slot::<SmaState>(bar_index, call_site)?
                    .update(source, length);
                Ok(Value::Number(out))
            }
            "ema" => {
                let source = args[0].as_number();
                let length = args[1].as_number() as i64;
                let out = state
                    .get_or_init_slot::<EmaState>(bar_index, call_site)?
                    .update(source, length);
                Ok(Value::Number(out))
            }
            "rma" => {
                let source = args[0].as_number();
                let length = args[1].as_number() as i64;
                let out = state
                    .get_or_init_slot::<EmaState>(bar_index, call_site)?
                    .update_rma(source, length);
                Ok(Value::Number(out))
            }
            "wma" => {
                let source = args[0].as_number();
                let length = args[1].as_number() as i64;
                let out = state
                    .get_or_init_slot::<WmaState>(bar_index, call_site)?
                    .update(source, length);
                Ok(Value::Number(out))
            }
            "bb" => {
                let source = args[0].as_number();
                let length = args[1].as_number() as i64;
                let mult = args[2].as_number();
                let stats = state
                    .get_or_init_slot::<VarianceState>(bar_index, call_site)?
                    .update(source, length);
                Ok(Value::Array(vec![
                    Value::Number(stats.mean),
                    Value::Number(stats.mean + mult * stats.stdev),
                    Value::Number(stats.mean - mult * stats.stdev),
                ]))
            }
            "vwma" => {
                let source = args[0].as_number();
                let volume = args[1].as_number();
                let length = args[2].as_number() as i64;
                let out = derived::vwma(state, bar_index, call_site, source, volume, length)?;
                Ok(Value::Number(out))
            }
            "swma" => {
                let source = args[0].as_number();
                let out = state
                    .get_or_init_slot::<derived::SwmaState>(bar_index, call_site)?
                    .update(source);
                Ok(Value::Number(out))
            }
            "rsi" => {
                let source = args[0].as_number();
                let length = args[1].as_number() as i64;
                let out = state
                    .get_or_init_slot::<derived::RsiState>(bar_index, call_site)?
                    .update(source, length);
                Ok(Value::Number(out))
            }
            "macd" => {
                let source = args[0].as_number();
                let fast = args[1].as_number() as i64;
                let slow = args[2].as_number() as i64;
                let signal = args[3].as_number() as i64;
                let (macd_line, signal_line, hist) =
                    derived::macd(state, bar_index, call_site, source, fast, slow, signal)?;
                Ok(Value::Array(vec![
                    Value::Number(macd_line),
                    Value::Number(signal_line),
                    Value::Number(hist),
                ]))
            }
            "mom" => {
                let source = args[0].as_number();
                let length = args[1].as_number() as i64;
                let out = state
                    .get_or_init_slot::<derived::MomState>(bar_index, call_site)?
                    .update(source, length);
                Ok(Value::Number(out))
            }
            "cci" => {
                let source = args[0].as_number();
                let length = args[1].as_number() as i64;
                let out = state
                    .get_or_init_slot::<derived::CciState>(bar_index, call_site)?
                    .update(source, length);
                Ok(Value::Number(out))
            }
            "stoch" => {
                let close = args[0].as_number();
                let high = args[1].as_number();
                let low = args[2].as_number();
                let length = args[3].as_number() as i64;
                let smooth_d = args[4].as_number() as i64;
                let (k, d) = derived::stoch(
                    state, bar_index, call_site, close, high, low, length, smooth_d,
                )?;
                Ok(Value::Array(vec![Value::Number(k), Value::Number(d)]))
            }
            "highest" => {
                let source = args[0].as_number();
                let length = args[1].as_number() as i64;
                let (hi, _) = state
                    .get_or_init_slot::<ExtremaState>(bar_index, call_site)?
                    .update(source, length);
                Ok(Value::Number(hi.value))
            }
            "lowest" => {
                let source = args[0].as_number();
                let length = args[1].as_number() as i64;
                let (_, lo) = state
                    .get_or_init_slot::<ExtremaState>(bar_index, call_site)?
                    .update(source, length);
                Ok(Value::Number(lo.value))
            }
            "highestbars" => {
                let source = args[0].as_number();
                let length = args[1].as_number() as i64;
                let (hi, _) = state
                    .get_or_init_slot::<ExtremaState>(bar_index, call_site)?
                    .update(source, length);
                Ok(Value::Number(-hi.bars_ago as f64))
            }
            "lowestbars" => {
                let source = args[0].as_number();
                let length = args[1].as_number() as i64;
                let (_, lo) = state
                    .get_or_init_slot::<ExtremaState>(bar_index, call_site)?
                    .update(source, length);
                Ok(Value::Number(-lo.bars_ago as f64))
            }
            "cross" => {
                let a = args[0].as_number();
                let b = args[1].as_number();
                let out = state
                    .get_or_init_slot::<derived::CrossState>(bar_index, call_site)?
                    .cross(a, b);
                Ok(Value::Bool(out))
            }
            "crossover" => {
                let a = args[0].as_number();
                let b = args[1].as_number();
                let out = state
                    .get_or_init_slot::<derived::CrossState>(bar_index, call_site)?
                    .crossover(a, b);
                Ok(Value::Bool(out))
            }
            "crossunder" => {
                let a = args[0].as_number();
                let b = args[1].as_number();
                let out = state
                    .get_or_init_slot::<derived::CrossState>(bar_index, call_site)?
                    .crossunder(a, b);
                Ok(Value::Bool(out))
            }
            "plot" => {
                let value = args[0].as_number();
                let title = match &args[1] {
                    Value::Str(s) if !s.is_empty() => s.clone(),
                    _ => format!("plot_{}", call_site.start),
                };
                self.ctx.plots.register(&title, value);
                Ok(args[0].clone())
            }
            "strategy.entry" => {
                let id = match &args[0] {
                    Value::Str(s) => s.clone(),
                    _ => "entry".to_string(),
                };
                let direction = match &args[1] {
                    Value::Str(s) if s.eq_ignore_ascii_case("short") => Direction::Short,
                    Value::Bool(false) => Direction::Short,
                    _ => Direction::Long,
                };
                let quantity = args[2].as_number();
                let price = self.ctx.close;
                let time = self.ctx.time;
                self.ctx
                    .strategy
                    .entry(&id, direction, quantity, price, time);
                Ok(Value::Bool(true))
            }
            "strategy.close" => {
                let price = self.ctx.close;
                let time = self.ctx.time;
                self.ctx.strategy.close(price, time);
                Ok(Value::Bool(true))
            }
            "strategy.close_all" => {
                let price = self.ctx.close;
                let time = self.ctx.time;
                self.ctx.strategy.close_all(price, time);
                Ok(Value::Bool(true))
            }
            _ => Err(RuntimeError::UnknownBuiltin {
                name: name.to_string(),
                call_site,
            }),
        }
    }
}

fn bind_args(spec: &BuiltinSpec, positional: &[Value], keyword: &[(String, Value)]) -> Vec<Value> {
    let mut bound: Vec<Option<Value>> = vec![None; spec.params.len()];
    for (i, v) in positional.iter().enumerate() {
        if i < bound.len() {
            bound[i] = Some(v.clone());
        }
    }
    for (name, v) in keyword {
        if let Some(i) = spec.param_index(name) {
            bound[i] = Some(v.clone());
        }
    }
    bound
        .into_iter()
        .zip(spec.params.iter())
        .map(|(v, param)| {
            v.unwrap_or_else(|| match &param.default {
                Some(lit) => Value::from(lit),
                None => Value::Number(f64::NAN),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plot_sma_accumulates_series() {
        let program = compile("plot(sma(close, 3))\n").expect("compiles");
        let mut ctx = Context::new();
        for c in [1.0, 2.0, 3.0, 4.0, 5.0] {
            let bar = Bar {
                time: 0,
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 10.0,
            };
            program.feed(&mut ctx, bar).expect("runs");
        }
        let title = ctx.plots.titles().next().expect("plot registered a series");
        let series = ctx.plots.series(title).unwrap();
        assert_eq!(series.len(), 5);
        assert!((series[4] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn strategy_entry_then_close_realizes_pnl() {
        let source = "if bar_index == 0\n    strategy.entry(\"long\", \"long\", 1)\nif close > 20\n    strategy.close(\"long\")\n";
        let program = compile(source).expect("compiles");
        let mut ctx = Context::with_initial_cash(1000.0);
        let closes = [5.0, 8.0, 25.0];
        for (i, &c) in closes.iter().enumerate() {
            let bar = Bar {
                time: i as i64,
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1.0,
            };
            program.feed(&mut ctx, bar).expect("runs");
        }
        assert_eq!(ctx.strategy.trades.len(), 1);
        assert_eq!(ctx.strategy.trades[0].pnl, 20.0);
    }

    #[test]
    fn for_loop_sums_a_range() {
        let source = "f()\n    total = 0\n    for i = 1 to 5\n        total := total + i\n    total\nplot(f())\n";
        let program = compile(source).expect("compiles");
        let mut ctx = Context::new();
        let bar = Bar {
            time: 0,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        };
        program.feed(&mut ctx, bar).expect("runs");
        let title = ctx.plots.titles().next().expect("plot registered a series");
        assert_eq!(ctx.plots.series(title).unwrap(), &[15.0]);
    }

    #[test]
    fn user_function_is_callable() {
        let source = "double(x) => x * 2\nplot(double(close))\n";
        let program = compile(source).expect("compiles");
        let mut ctx = Context::new();
        let bar = Bar {
            time: 0,
            open: 5.0,
            high: 5.0,
            low: 5.0,
            close: 5.0,
            volume: 1.0,
        };
        program.feed(&mut ctx, bar).expect("runs");
        let series = ctx.plots.titles().next().map(|t| ctx.plots.series(t).unwrap().to_vec());
        assert_eq!(series.unwrap(), vec![10.0]);
    }
}
