/// Identifies a single compiled source within a `Span`. One file per
/// compile call today; kept as a distinct newtype rather than folded into
/// `Span` so a future multi-file compile unit doesn't need to touch every
/// call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SourceId(pub u16);

/// A script's source text plus the name used in diagnostics.
#[derive(Clone, Debug)]
pub struct Source {
    pub name: String,
    pub text: String,
}

impl Source {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}
