use crate::ast::Literal;

/// One formal parameter of a builtin: its keyword name and, if optional,
/// the literal to use when the caller omits it (§4.3's call-binding
/// rules — positional args fill left to right, keyword args bind by
/// name, anything left over falls back to its default).
pub struct Param {
    pub name: &'static str,
    pub default: Option<Literal>,
}

const fn required(name: &'static str) -> Param {
    Param { name, default: None }
}

const fn optional_int(name: &'static str, default: i64) -> Param {
    Param {
        name,
        default: Some(Literal::Int(default)),
    }
}

/// Static signature of a builtin operation: its name and formal
/// parameters, used both to validate call sites during lowering (C3)
/// and to bind arguments during evaluation (C4).
pub struct BuiltinSpec {
    pub name: &'static str,
    pub params: &'static [Param],
}

macro_rules! spec {
    ($name:literal, [$($p:expr),* $(,)?]) => {
        BuiltinSpec {
            name: $name,
            params: &[$($p),*],
        }
    };
}

pub static BUILTINS: &[BuiltinSpec] = &[
    spec!("sma", [required("source"), optional_int("length", 14)]),
    spec!("ema", [required("source"), optional_int("length", 14)]),
    spec!("rma", [required("source"), optional_int("length", 14)]),
    spec!("wma", [required("source"), optional_int("length", 14)]),
    spec!(
        "bb",
        [
            required("source"),
            optional_int("length", 20),
            Param {
                name: "mult",
                default: Some(Literal::Float(2.0)),
            },
        ]
    ),
    spec!(
        "vwma",
        [required("source"), required("volume"), optional_int("length", 20)]
    ),
    spec!("swma", [required("source")]),
    spec!("rsi", [required("source"), optional_int("length", 14)]),
    spec!(
        "macd",
        [
            required("source"),
            optional_int("fast_length", 12),
            optional_int("slow_length", 26),
            optional_int("signal_length", 9),
        ]
    ),
    spec!("mom", [required("source"), optional_int("length", 10)]),
    spec!("cci", [required("source"), optional_int("length", 20)]),
    spec!(
        "stoch",
        [
            required("close"),
            required("high"),
            required("low"),
            optional_int("length", 14),
            optional_int("smooth_d", 3),
        ]
    ),
    spec!("highest", [required("source"), optional_int("length", 14)]),
    spec!("lowest", [required("source"), optional_int("length", 14)]),
    spec!(
        "highestbars",
        [required("source"), optional_int("length", 14)]
    ),
    spec!(
        "lowestbars",
        [required("source"), optional_int("length", 14)]
    ),
    spec!("cross", [required("a"), required("b")]),
    spec!("crossover", [required("a"), required("b")]),
    spec!("crossunder", [required("a"), required("b")]),
    spec!("plot", [required("series"), optional_title()]),
    spec!(
        "strategy.entry",
        [
            required("id"),
            required("direction"),
            optional_int("quantity", 1),
        ]
    ),
    spec!("strategy.close", [required("id")]),
    spec!("strategy.close_all", []),
];

const fn optional_title() -> Param {
    Param {
        name: "title",
        default: Some(Literal::Str(String::new())),
    }
}

pub fn lookup(name: &str) -> Option<&'static BuiltinSpec> {
    BUILTINS.iter().find(|b| b.name == name)
}

impl BuiltinSpec {
    /// Minimum number of args (those with no default) this builtin needs.
    pub fn min_arity(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }

    pub fn max_arity(&self) -> usize {
        self.params.len()
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_has_one_required_and_one_optional() {
        let spec = lookup("sma").unwrap();
        assert_eq!(spec.min_arity(), 1);
        assert_eq!(spec.max_arity(), 2);
    }

    #[test]
    fn unknown_builtin_is_none() {
        assert!(lookup("frobnicate").is_none());
    }

    #[test]
    fn strategy_close_all_takes_no_args() {
        let spec = lookup("strategy.close_all").unwrap();
        assert_eq!(spec.min_arity(), 0);
        assert_eq!(spec.max_arity(), 0);
    }

    #[test]
    fn param_index_finds_named_param() {
        let spec = lookup("bb").unwrap();
        assert_eq!(spec.param_index("mult"), Some(2));
        assert_eq!(spec.param_index("nonexistent"), None);
    }
}
