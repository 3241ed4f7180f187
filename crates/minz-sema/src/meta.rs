//! Metafunctions (spec §4.8): `@print`/`@to_string` and the string
//! interpolation sugars, `@minz`/`@define` compile-time source
//! expansion, `@if`/`@elif`/`@else`, and the optional `@lua` block.
//!
//! All of this runs during semantic analysis; none of it leaves
//! runtime code unless it explicitly emits such code via `@emit`.
//! Since the parser is out of scope for this workspace (§1), the
//! "reparse emitted source" step that `@minz`/`@define` need is
//! expressed as the injected [`SourceParser`] trait rather than a
//! concrete dependency — the driver supplies the real parser.

use minz_ast::{Decl, Expr, ExprKind, FormatPiece};
use minz_diagnostics::{Diagnostic, Position};
use rustc_hash::FxHashMap;

/// The compile-time constants provided to source (spec §6.4):
/// `TARGET`, the per-target `TARGET_*` boolean flags, and `DEBUG`.
#[derive(Debug, Clone)]
pub struct CompileTimeConstants {
    pub target: String,
    pub target_flags: FxHashMap<String, bool>,
    pub debug: bool,
}

impl CompileTimeConstants {
    pub fn for_target(target: &str, debug: bool) -> Self {
        let known = ["spectrum", "cpm", "amstrad", "msx", "generic"];
        let mut flags = FxHashMap::default();
        for t in known {
            flags.insert(format!("TARGET_{}", t.to_uppercase()), t == target);
        }
        CompileTimeConstants { target: target.to_string(), target_flags: flags, debug }
    }

    pub fn lookup_bool(&self, name: &str) -> Option<bool> {
        if name == "DEBUG" {
            return Some(self.debug);
        }
        self.target_flags.get(name).copied()
    }
}

/// Anything capable of turning emitted/templated source text back into
/// declarations — supplied by the driver, since the actual MinZ parser
/// is out of scope here (§6.1).
pub trait SourceParser {
    fn parse_fragment(&self, source: &str, pos: Position) -> Result<Vec<Decl>, Diagnostic>;
}

/// Split a `@print`/`@to_string`-style format string containing `{}`
/// placeholders into literal segments interleaved with the
/// already-parsed argument expressions (spec §4.8). `fmt` is the
/// static format-string text; `args` is matched positionally against
/// each `{}` hole.
pub fn parse_format_string(fmt: &str, args: &[Expr], pos: Position) -> Result<Vec<FormatPiece>, Diagnostic> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut chars = fmt.chars().peekable();
    let mut arg_iter = args.iter();
    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'}') {
            chars.next();
            if !literal.is_empty() {
                pieces.push(FormatPiece::Literal(std::mem::take(&mut literal)));
            }
            let arg = arg_iter.next().ok_or_else(|| Diagnostic::MacroExpansionFailed {
                pos,
                reason: "more `{}` placeholders than arguments".into(),
            })?;
            pieces.push(FormatPiece::Interpolate(Box::new(arg.clone())));
        } else {
            literal.push(c);
        }
    }
    if !literal.is_empty() {
        pieces.push(FormatPiece::Literal(literal));
    }
    if arg_iter.next().is_some() {
        return Err(Diagnostic::MacroExpansionFailed { pos, reason: "more arguments than `{}` placeholders".into() });
    }
    Ok(pieces)
}

/// Desugar an interpolated string (`FormatPiece` list already split by
/// the parser for the `#{}`/`f"{}"` sugars) into the `@to_string`
/// engine: literal runs stay literal, interpolation holes become
/// `ToString(expr)`, and the whole thing becomes a `Concat` (§4.8).
///
/// `next_id` is the driver's running node-id allocator, continued from
/// wherever the parser left off, so every synthesized node gets a
/// fresh id rather than colliding with a real one in the type table.
pub fn desugar_interpolated(pieces: &[FormatPiece], pos: Position, next_id: &mut u32) -> Expr {
    use minz_entity::EntityRef;
    let mut fresh = || {
        let id = minz_ast::NodeId::new(*next_id as usize);
        *next_id += 1;
        id
    };
    let parts: Vec<Expr> = pieces
        .iter()
        .map(|p| match p {
            FormatPiece::Literal(s) => Expr::new(fresh(), ExprKind::StringLiteral(s.clone()), pos),
            FormatPiece::Interpolate(e) => Expr::new(e.id, ExprKind::ToString(e.clone()), e.pos),
        })
        .collect();
    Expr::new(fresh(), ExprKind::Concat(parts), pos)
}

/// Evaluate an `@if(cond) { .. } @elif(cond) { .. } @else { .. }`
/// condition against the active compile-time constants. Only the
/// subset of expressions needed for these conditions is supported:
/// identifiers naming a `TARGET_*`/`DEBUG` flag, boolean literals, and
/// `!`/`&&`/`||` combinations — sufficient for the documented use
/// (§4.8); anything else is a `MacroExpansionFailed`.
pub fn eval_compile_condition(expr: &Expr, consts: &CompileTimeConstants) -> Result<bool, Diagnostic> {
    match &expr.kind {
        ExprKind::BoolLiteral(b) => Ok(*b),
        ExprKind::Identifier(name) => consts
            .lookup_bool(name)
            .ok_or_else(|| Diagnostic::MacroExpansionFailed { pos: expr.pos, reason: format!("`{name}` is not a known compile-time flag") }),
        ExprKind::Unary(minz_ast::UnOp::Not, inner) => Ok(!eval_compile_condition(inner, consts)?),
        ExprKind::Binary(minz_ast::BinOp::LogicalAnd, a, b) => Ok(eval_compile_condition(a, consts)? && eval_compile_condition(b, consts)?),
        ExprKind::Binary(minz_ast::BinOp::LogicalOr, a, b) => Ok(eval_compile_condition(a, consts)? || eval_compile_condition(b, consts)?),
        _ => Err(Diagnostic::MacroExpansionFailed { pos: expr.pos, reason: "unsupported @if condition form".into() }),
    }
}

/// Resolve an `@if`/`@elif`/`@else` chain to the single branch body
/// that should replace it in the tree.
pub fn select_compile_branch<'a>(
    branches: &'a [(Expr, Expr)],
    else_branch: Option<&'a Expr>,
    consts: &CompileTimeConstants,
) -> Result<Option<&'a Expr>, Diagnostic> {
    for (cond, body) in branches {
        if eval_compile_condition(cond, consts)? {
            return Ok(Some(body));
        }
    }
    Ok(else_branch)
}

/// Substitute `{0}`, `{1}`, … positional placeholders in a
/// `@define`-declared `template` with the textual rendering of each
/// argument, producing the source text to hand to [`SourceParser`]
/// (spec §4.8). Arguments must already be compile-time constants;
/// rendering mirrors how they'd appear as MinZ source literals.
pub fn render_define_template(template: &str, values: &[String]) -> String {
    let mut out = template.to_string();
    for (i, v) in values.iter().enumerate() {
        out = out.replace(&format!("{{{i}}}"), v);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_entity::EntityRef;

    fn lit(n: u64) -> Expr {
        Expr::new(minz_ast::NodeId::new(0), ExprKind::IntLiteral(n), Position::synthetic())
    }

    #[test]
    fn format_string_splits_on_braces() {
        let args = vec![lit(5)];
        let pieces = parse_format_string("x = {}!", &args, Position::synthetic()).unwrap();
        assert_eq!(pieces.len(), 2);
        matches!(pieces[0], FormatPiece::Literal(_));
        matches!(pieces[1], FormatPiece::Interpolate(_));
    }

    #[test]
    fn format_string_mismatch_is_an_error() {
        let err = parse_format_string("{} {}", &[lit(1)], Position::synthetic()).unwrap_err();
        assert_eq!(err.kind_str(), "MacroExpansionFailed");
    }

    #[test]
    fn target_flags_select_exactly_one() {
        let consts = CompileTimeConstants::for_target("spectrum", false);
        assert_eq!(consts.lookup_bool("TARGET_SPECTRUM"), Some(true));
        assert_eq!(consts.lookup_bool("TARGET_CPM"), Some(false));
    }

    #[test]
    fn compile_if_picks_matching_branch() {
        let consts = CompileTimeConstants::for_target("cpm", false);
        let cond_a = Expr::new(minz_ast::NodeId::new(0), ExprKind::Identifier("TARGET_SPECTRUM".into()), Position::synthetic());
        let body_a = lit(1);
        let cond_b = Expr::new(minz_ast::NodeId::new(0), ExprKind::Identifier("TARGET_CPM".into()), Position::synthetic());
        let body_b = lit(2);
        let branches = vec![(cond_a, body_a), (cond_b, body_b)];
        let chosen = select_compile_branch(&branches, None, &consts).unwrap().unwrap();
        match chosen.kind {
            ExprKind::IntLiteral(n) => assert_eq!(n, 2),
            _ => panic!(),
        }
    }

    #[test]
    fn define_template_substitutes_positionally() {
        let rendered = render_define_template("fun f({0}: u8) -> u8 { {0} }", &["x".to_string()]);
        assert_eq!(rendered, "fun f(x: u8) -> u8 { x }");
    }
}
