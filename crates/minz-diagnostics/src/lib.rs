//! Source positions and compiler diagnostics.
//!
//! This crate is the shared vocabulary every other MinZ crate reports
//! through: a [`Position`] locates a span in the original source text,
//! a [`Diagnostic`] names one of the failure kinds enumerated by the
//! specification, and [`Diagnostics`] is the append-only bag the
//! driver accumulates across passes before deciding whether to
//! continue (see the propagation policy in the top-level driver).

use std::fmt;

/// A location in source text, as produced by the (out-of-scope) parser.
///
/// Every AST node carries a `Position`; every diagnostic that can be
/// tied to source text carries one too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
    pub length: u32,
}

impl Position {
    pub const fn new(line: u32, column: u32, offset: u32, length: u32) -> Self {
        Position { line, column, offset, length }
    }

    /// A placeholder position for synthesized nodes (hoisted lambdas,
    /// `@emit`ted declarations) that have no direct source span.
    pub const fn synthetic() -> Self {
        Position { line: 0, column: 0, offset: 0, length: 0 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Diagnostic severity. `Fatal` diagnostics stop the pipeline from
/// advancing to the next pass (see §4.17 of the specification);
/// `Warning` never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Fatal => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// One overload candidate, as listed in `NoMatchingOverload` and
/// `AmbiguousOverload` diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDesc {
    pub mangled_name: String,
    pub signature: String,
}

impl fmt::Display for CandidateDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.mangled_name, self.signature)
    }
}

/// Every failure kind named by the specification's §7 error handling
/// design. Variants are grouped by the section that defines them;
/// `kind_str` is the stable machine-readable tag used in tests.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Diagnostic {
    // --- Syntax (forwarded unchanged from the out-of-scope parser) ---
    #[error("{message}")]
    Syntax { pos: Position, message: String },

    // --- Semantic resolution (§4.1–§4.6) ---
    #[error("undefined identifier `{name}`{suggestion}")]
    UndefinedIdentifier { name: String, pos: Position, suggestion: Suggestion },
    #[error("duplicate definition of `{name}`")]
    DuplicateDefinition { name: String, pos: Position, first_pos: Position },
    #[error("value is not callable")]
    NotCallable { pos: Position },
    #[error("expected {expected} argument(s), found {actual}")]
    WrongArity { expected: usize, actual: usize, pos: Position },
    #[error("no overload of `{name}` matches the given arguments")]
    NoMatchingOverload { name: String, pos: Position, candidates: Vec<CandidateDesc> },
    #[error("call to `{name}` is ambiguous between {} candidates", candidates.len())]
    AmbiguousOverload { name: String, pos: Position, candidates: Vec<CandidateDesc> },
    #[error("dispatch on an interface value requires a statically known concrete type")]
    PolymorphicDispatchRequiresConcreteType { pos: Position },
    #[error("lambda captures `{name}` from an enclosing scope, which is not supported (use @curry)")]
    LambdaCaptureNotSupported { name: String, pos: Position },
    #[error("`pub fun` nested inside a function body is not supported")]
    NestedPubFunUnsupported { pos: Position },

    // --- Type (§4.2) ---
    #[error("type mismatch: expected `{expected}`, found `{actual}`")]
    TypeMismatch { expected: String, actual: String, pos: Position },
    #[error("cannot assign to immutable binding `{name}`")]
    ImmutableAssignment { name: String, pos: Position },
    #[error("invalid cast from `{from}` to `{to}`")]
    InvalidCast { from: String, to: String, pos: Position },
    #[error("condition must have type `bool`, found `{actual}`")]
    NonBooleanCondition { actual: String, pos: Position },
    #[error("no field `{field}` on type `{ty}`")]
    FieldNotFound { field: String, ty: String, pos: Position },
    #[error("type `{ty}` is not a struct")]
    NotAStruct { ty: String, pos: Position },
    #[error("type `{ty}` is not an array")]
    NotAnArray { ty: String, pos: Position },

    // --- Metaprogramming (§4.8, §4.11) ---
    #[error("macro expansion failed: {reason}")]
    MacroExpansionFailed { pos: Position, reason: String },
    #[error("emitted code failed to parse: {reason}")]
    EmittedCodeParseError { pos: Position, reason: String },
    #[error("compile-time recursion exceeded the configured depth ({limit} frames)")]
    CtieDepthExceeded { pos: Position, limit: u32 },
    #[error("compile-time execution exceeded the configured iteration cap ({limit})")]
    CtieIterationCapExceeded { pos: Position, limit: u64 },
    #[error("compile-time trap: {reason}")]
    CompileTimeTrap { pos: Position, reason: String },
    #[error("compile-time execution observed undefined behavior: {reason}")]
    CtieUndefinedBehavior { pos: Position, reason: String },

    // --- Warnings (non-fatal) ---
    #[error("match arm is unreachable")]
    UnreachableMatchArm { pos: Position },
    #[error("match does not cover all enum variants")]
    NonExhaustiveMatch { pos: Position, missing: Vec<String> },
    #[error("symbol `{name}` is never used")]
    UnusedSymbol { name: String, pos: Position },
    #[error("cast between types of differing signedness may change the value's sign")]
    IntegerCastOverlapsSign { pos: Position },
}

/// Whether `@emit` or `@minz`-produced suggestion text should be
/// appended to an `UndefinedIdentifier` message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Suggestion(pub Option<String>);

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => write!(f, " (did you mean `{name}`?)"),
            None => Ok(()),
        }
    }
}

impl Diagnostic {
    /// The severity of this diagnostic. All variants are fatal except
    /// the explicitly enumerated warnings (§7).
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::UnreachableMatchArm { .. }
            | Diagnostic::NonExhaustiveMatch { .. }
            | Diagnostic::UnusedSymbol { .. }
            | Diagnostic::IntegerCastOverlapsSign { .. } => Severity::Warning,
            _ => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// The position best associated with this diagnostic, used for
    /// rendering and for sorting.
    pub fn position(&self) -> Position {
        use Diagnostic::*;
        match self {
            Syntax { pos, .. }
            | UndefinedIdentifier { pos, .. }
            | DuplicateDefinition { pos, .. }
            | NotCallable { pos }
            | WrongArity { pos, .. }
            | NoMatchingOverload { pos, .. }
            | AmbiguousOverload { pos, .. }
            | PolymorphicDispatchRequiresConcreteType { pos }
            | LambdaCaptureNotSupported { pos, .. }
            | NestedPubFunUnsupported { pos }
            | TypeMismatch { pos, .. }
            | ImmutableAssignment { pos, .. }
            | InvalidCast { pos, .. }
            | NonBooleanCondition { pos, .. }
            | FieldNotFound { pos, .. }
            | NotAStruct { pos, .. }
            | NotAnArray { pos, .. }
            | MacroExpansionFailed { pos, .. }
            | EmittedCodeParseError { pos, .. }
            | CtieDepthExceeded { pos, .. }
            | CtieIterationCapExceeded { pos, .. }
            | CompileTimeTrap { pos, .. }
            | CtieUndefinedBehavior { pos, .. }
            | UnreachableMatchArm { pos }
            | NonExhaustiveMatch { pos, .. }
            | UnusedSymbol { pos, .. }
            | IntegerCastOverlapsSign { pos } => *pos,
        }
    }

    /// A stable, machine-readable tag for this diagnostic's kind; used
    /// by tests and by callers that want to match on kind without a
    /// full `match` over the enum.
    pub fn kind_str(&self) -> &'static str {
        use Diagnostic::*;
        match self {
            Syntax { .. } => "Syntax",
            UndefinedIdentifier { .. } => "UndefinedIdentifier",
            DuplicateDefinition { .. } => "DuplicateDefinition",
            NotCallable { .. } => "NotCallable",
            WrongArity { .. } => "WrongArity",
            NoMatchingOverload { .. } => "NoMatchingOverload",
            AmbiguousOverload { .. } => "AmbiguousOverload",
            PolymorphicDispatchRequiresConcreteType { .. } => "PolymorphicDispatchRequiresConcreteType",
            LambdaCaptureNotSupported { .. } => "LambdaCaptureNotSupported",
            NestedPubFunUnsupported { .. } => "NestedPubFunUnsupported",
            TypeMismatch { .. } => "TypeMismatch",
            ImmutableAssignment { .. } => "ImmutableAssignment",
            InvalidCast { .. } => "InvalidCast",
            NonBooleanCondition { .. } => "NonBooleanCondition",
            FieldNotFound { .. } => "FieldNotFound",
            NotAStruct { .. } => "NotAStruct",
            NotAnArray { .. } => "NotAnArray",
            MacroExpansionFailed { .. } => "MacroExpansionFailed",
            EmittedCodeParseError { .. } => "EmittedCodeParseError",
            CtieDepthExceeded { .. } => "CTIEDepthExceeded",
            CtieIterationCapExceeded { .. } => "CTIEIterationCapExceeded",
            CompileTimeTrap { .. } => "CompileTimeTrap",
            CtieUndefinedBehavior { .. } => "CTIEUndefinedBehavior",
            UnreachableMatchArm { .. } => "UnreachableMatchArm",
            NonExhaustiveMatch { .. } => "NonExhaustiveMatch",
            UnusedSymbol { .. } => "UnusedSymbol",
            IntegerCastOverlapsSign { .. } => "IntegerCastOverlapsSign",
        }
    }

    /// Render as `<path>:<line>:<col>: <severity>: <message>` (§7).
    pub fn render(&self, path: &str) -> String {
        let pos = self.position();
        format!("{}:{}:{}: {}: {}", path, pos.line, pos.column, self.severity(), self)
    }
}

/// The append-only bag of diagnostics a compilation accumulates.
///
/// The driver owns exactly one of these per compilation unit (§5: the
/// `Module` and everything the passes report through is exclusively
/// owned by the current compilation).
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.items.push(diag);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// True if any accumulated diagnostic is fatal. Per §4.17, a fatal
    /// diagnostic in a pass suppresses subsequent passes.
    pub fn has_fatal(&self) -> bool {
        self.items.iter().any(Diagnostic::is_fatal)
    }

    pub fn fatal_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_fatal()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.items.iter().filter(|d| !d.is_fatal()).count()
    }

    pub fn render_all(&self, path: &str) -> String {
        let mut out = String::new();
        for d in &self.items {
            out.push_str(&d.render(path));
            out.push('\n');
        }
        out
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

/// Levenshtein edit distance between two strings, used to compute
/// "did you mean …?" suggestions (§7): a candidate is suggested when
/// its distance from the misspelled identifier is at most 2.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }
    let mut prev: Vec<usize> = (0..=m).collect();
    let mut cur = vec![0usize; m + 1];
    for i in 1..=n {
        cur[0] = i;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[m]
}

/// Find the closest candidate to `name` among `candidates` within edit
/// distance 2, preferring the closest and, on ties, the first in
/// iteration order (stable with respect to scope-chain nearest-first
/// ordering).
pub fn suggest_closest<'a, I>(name: &str, candidates: I) -> Suggestion
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(usize, &str)> = None;
    for cand in candidates {
        if cand == name {
            continue;
        }
        let d = levenshtein(name, cand);
        if d <= 2 {
            match best {
                Some((bd, _)) if bd <= d => {}
                _ => best = Some((d, cand)),
            }
        }
    }
    Suggestion(best.map(|(_, name)| name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("prnt", "print"), 1);
    }

    #[test]
    fn suggest_picks_nearest_within_distance_two() {
        let s = suggest_closest("prnt", ["print", "println", "printf_u8"]);
        assert_eq!(s.0.as_deref(), Some("print"));
    }

    #[test]
    fn suggest_none_beyond_distance_two() {
        let s = suggest_closest("xyz123", ["print", "main"]);
        assert_eq!(s.0, None);
    }

    #[test]
    fn diagnostics_fatal_tracking() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_fatal());
        diags.push(Diagnostic::UnusedSymbol { name: "x".into(), pos: Position::synthetic() });
        assert!(!diags.has_fatal());
        diags.push(Diagnostic::NotCallable { pos: Position::synthetic() });
        assert!(diags.has_fatal());
        assert_eq!(diags.fatal_count(), 1);
        assert_eq!(diags.warning_count(), 1);
    }

    #[test]
    fn render_format() {
        let d = Diagnostic::UndefinedIdentifier {
            name: "foo".into(),
            pos: Position::new(3, 5, 40, 3),
            suggestion: Suggestion(Some("food".into())),
        };
        let rendered = d.render("main.minz");
        assert_eq!(rendered, "main.minz:3:5: error: undefined identifier `foo` (did you mean `food`?)");
    }
}
