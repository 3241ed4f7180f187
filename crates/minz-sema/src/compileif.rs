//! Resolves `@if`/`@elif`/`@else` chains (spec §4.8) against the
//! active compile-time constants. Runs before lambda hoisting and
//! type checking so that every other pass only ever sees the single
//! branch the active `TARGET`/`DEBUG` selected — a `CompileIf` node
//! reaching the MIR builder means this pass was skipped, not that one
//! legitimately survived analysis.

use minz_ast::{Decl, Expr, ExprKind, FormatPiece, Module, Pattern, Stmt, StmtKind};
use minz_diagnostics::Diagnostics;

use crate::meta::{select_compile_branch, CompileTimeConstants};

/// Resolves every `CompileIf` node in `module`'s function (and `impl`
/// method) bodies in place. A condition that fails to evaluate (an
/// unsupported form, an unknown flag) is pushed onto `diags`; analysis
/// continues by falling back to the chain's first branch so a single
/// bad `@if` doesn't stop the rest of the module from being checked
/// (§4.17).
pub fn resolve_module(module: &mut Module, consts: &CompileTimeConstants, diags: &mut Diagnostics) {
    for decl in &mut module.decls {
        match decl {
            Decl::Function(f) => resolve_body(&mut f.body.stmts, &mut f.body.tail, consts, diags),
            Decl::Impl(impl_decl) => {
                for method in &mut impl_decl.methods {
                    resolve_body(&mut method.body.stmts, &mut method.body.tail, consts, diags);
                }
            }
            _ => {}
        }
    }
}

fn resolve_body(stmts: &mut [Stmt], tail: &mut Option<Expr>, consts: &CompileTimeConstants, diags: &mut Diagnostics) {
    for stmt in stmts.iter_mut() {
        resolve_stmt(stmt, consts, diags);
    }
    if let Some(t) = tail {
        *t = resolve_expr(t, consts, diags);
    }
}

fn resolve_stmt(stmt: &mut Stmt, consts: &CompileTimeConstants, diags: &mut Diagnostics) {
    match &mut stmt.kind {
        StmtKind::Let { value, .. } => *value = resolve_expr(value, consts, diags),
        StmtKind::Assign { target, value } => {
            *target = resolve_expr(target, consts, diags);
            *value = resolve_expr(value, consts, diags);
        }
        StmtKind::CompoundAssign { target, value, .. } => {
            *target = resolve_expr(target, consts, diags);
            *value = resolve_expr(value, consts, diags);
        }
        StmtKind::ExprStmt(e) => *e = resolve_expr(e, consts, diags),
        StmtKind::Return(e) => {
            if let Some(e) = e {
                *e = resolve_expr(e, consts, diags);
            }
        }
        StmtKind::ForRange { lo, hi, body, .. } => {
            *lo = resolve_expr(lo, consts, diags);
            *hi = resolve_expr(hi, consts, diags);
            for s in body.iter_mut() {
                resolve_stmt(s, consts, diags);
            }
        }
        StmtKind::While { cond, body } => {
            *cond = resolve_expr(cond, consts, diags);
            for s in body.iter_mut() {
                resolve_stmt(s, consts, diags);
            }
        }
        StmtKind::Loop { body } => {
            for s in body.iter_mut() {
                resolve_stmt(s, consts, diags);
            }
        }
        StmtKind::Break | StmtKind::Continue => {}
    }
}

/// Resolves `expr`, recursing structurally through every node kind
/// capable of containing a nested `@if`.
fn resolve_expr(expr: &Expr, consts: &CompileTimeConstants, diags: &mut Diagnostics) -> Expr {
    match &expr.kind {
        ExprKind::CompileIf { branches, else_branch } => {
            let resolved_branches: Vec<(Expr, Expr)> =
                branches.iter().map(|(c, b)| (resolve_expr(c, consts, diags), resolve_expr(b, consts, diags))).collect();
            let resolved_else = else_branch.as_ref().map(|e| resolve_expr(e, consts, diags));
            match select_compile_branch(&resolved_branches, resolved_else.as_ref(), consts) {
                Ok(Some(body)) => body.clone(),
                Ok(None) => Expr::new(expr.id, ExprKind::Block(vec![], None), expr.pos),
                Err(d) => {
                    diags.push(d);
                    resolved_branches.first().map(|(_, body)| body.clone()).unwrap_or_else(|| Expr::new(expr.id, ExprKind::Block(vec![], None), expr.pos))
                }
            }
        }
        ExprKind::Unary(op, inner) => Expr::new(expr.id, ExprKind::Unary(*op, Box::new(resolve_expr(inner, consts, diags))), expr.pos),
        ExprKind::Try(inner) => Expr::new(expr.id, ExprKind::Try(Box::new(resolve_expr(inner, consts, diags))), expr.pos),
        ExprKind::ToString(inner) => Expr::new(expr.id, ExprKind::ToString(Box::new(resolve_expr(inner, consts, diags))), expr.pos),
        ExprKind::Binary(op, lhs, rhs) => {
            Expr::new(expr.id, ExprKind::Binary(*op, Box::new(resolve_expr(lhs, consts, diags)), Box::new(resolve_expr(rhs, consts, diags))), expr.pos)
        }
        ExprKind::Call { callee, args } => {
            let callee = Box::new(resolve_expr(callee, consts, diags));
            let args = args.iter().map(|a| resolve_expr(a, consts, diags)).collect();
            Expr::new(expr.id, ExprKind::Call { callee, args }, expr.pos)
        }
        ExprKind::MethodCall { receiver, method, args } => {
            let receiver = Box::new(resolve_expr(receiver, consts, diags));
            let args = args.iter().map(|a| resolve_expr(a, consts, diags)).collect();
            Expr::new(expr.id, ExprKind::MethodCall { receiver, method: method.clone(), args }, expr.pos)
        }
        ExprKind::Field { base, field } => Expr::new(expr.id, ExprKind::Field { base: Box::new(resolve_expr(base, consts, diags)), field: field.clone() }, expr.pos),
        ExprKind::Index { base, index } => {
            let base = Box::new(resolve_expr(base, consts, diags));
            let index = Box::new(resolve_expr(index, consts, diags));
            Expr::new(expr.id, ExprKind::Index { base, index }, expr.pos)
        }
        ExprKind::Cast { expr: inner, ty } => Expr::new(expr.id, ExprKind::Cast { expr: Box::new(resolve_expr(inner, consts, diags)), ty: ty.clone() }, expr.pos),
        ExprKind::ArrayLiteral(items) => {
            Expr::new(expr.id, ExprKind::ArrayLiteral(items.iter().map(|e| resolve_expr(e, consts, diags)).collect()), expr.pos)
        }
        ExprKind::StructLiteral { type_name, fields } => {
            let fields = fields.iter().map(|f| minz_ast::Field { name: f.name.clone(), value: resolve_expr(&f.value, consts, diags) }).collect();
            Expr::new(expr.id, ExprKind::StructLiteral { type_name: type_name.clone(), fields }, expr.pos)
        }
        ExprKind::Lambda { params, ret, body } => {
            Expr::new(expr.id, ExprKind::Lambda { params: params.clone(), ret: ret.clone(), body: Box::new(resolve_expr(body, consts, diags)) }, expr.pos)
        }
        ExprKind::Curry { lambda, value } => {
            let lambda = Box::new(resolve_expr(lambda, consts, diags));
            let value = Box::new(resolve_expr(value, consts, diags));
            Expr::new(expr.id, ExprKind::Curry { lambda, value }, expr.pos)
        }
        ExprKind::If { cond, then_branch, else_branch } => {
            let cond = Box::new(resolve_expr(cond, consts, diags));
            let then_branch = Box::new(resolve_expr(then_branch, consts, diags));
            let else_branch = else_branch.as_ref().map(|e| Box::new(resolve_expr(e, consts, diags)));
            Expr::new(expr.id, ExprKind::If { cond, then_branch, else_branch }, expr.pos)
        }
        ExprKind::Block(stmts, tail) => {
            let mut stmts = stmts.clone();
            for s in stmts.iter_mut() {
                resolve_stmt(s, consts, diags);
            }
            let tail = tail.as_ref().map(|t| Box::new(resolve_expr(t, consts, diags)));
            Expr::new(expr.id, ExprKind::Block(stmts, tail), expr.pos)
        }
        ExprKind::IterChain { source, stages } => {
            let source = Box::new(resolve_expr(source, consts, diags));
            let stages = stages
                .iter()
                .map(|s| match s {
                    minz_ast::IterStage::Map(f) => minz_ast::IterStage::Map(Box::new(resolve_expr(f, consts, diags))),
                    minz_ast::IterStage::Filter(f) => minz_ast::IterStage::Filter(Box::new(resolve_expr(f, consts, diags))),
                    minz_ast::IterStage::ForEach(f) => minz_ast::IterStage::ForEach(Box::new(resolve_expr(f, consts, diags))),
                })
                .collect();
            Expr::new(expr.id, ExprKind::IterChain { source, stages }, expr.pos)
        }
        ExprKind::Print { format } => Expr::new(expr.id, ExprKind::Print { format: resolve_format_pieces(format, consts, diags) }, expr.pos),
        ExprKind::InterpolatedString(pieces) => Expr::new(expr.id, ExprKind::InterpolatedString(resolve_format_pieces(pieces, consts, diags)), expr.pos),
        ExprKind::Concat(pieces) => Expr::new(expr.id, ExprKind::Concat(pieces.iter().map(|e| resolve_expr(e, consts, diags)).collect()), expr.pos),
        ExprKind::DefineTemplate { name, args, template } => {
            let args = args.iter().map(|a| resolve_expr(a, consts, diags)).collect();
            Expr::new(expr.id, ExprKind::DefineTemplate { name: name.clone(), args, template: template.clone() }, expr.pos)
        }
        ExprKind::Match { scrutinee, arms } => {
            let scrutinee = Box::new(resolve_expr(scrutinee, consts, diags));
            let arms = arms
                .iter()
                .map(|arm| minz_ast::MatchArm {
                    pattern: resolve_pattern(&arm.pattern, consts, diags),
                    guard: arm.guard.as_ref().map(|g| resolve_expr(g, consts, diags)),
                    body: resolve_expr(&arm.body, consts, diags),
                    pos: arm.pos,
                })
                .collect();
            Expr::new(expr.id, ExprKind::Match { scrutinee, arms }, expr.pos)
        }
        // Leaves and constructs opaque at this stage (`@minz`/`@lua`
        // bodies are raw, unparsed source text).
        ExprKind::IntLiteral(_) | ExprKind::BoolLiteral(_) | ExprKind::StringLiteral(_) | ExprKind::Identifier(_) | ExprKind::MinzBlock(_) | ExprKind::LuaBlock(_) => {
            expr.clone()
        }
    }
}

fn resolve_pattern(pattern: &Pattern, consts: &CompileTimeConstants, diags: &mut Diagnostics) -> Pattern {
    match pattern {
        Pattern::Literal(e, pos) => Pattern::Literal(resolve_expr(e, consts, diags), *pos),
        Pattern::Struct { type_name, fields, pos } => {
            let fields = fields.iter().map(|(name, sub)| (name.clone(), resolve_pattern(sub, consts, diags))).collect();
            Pattern::Struct { type_name: type_name.clone(), fields, pos: *pos }
        }
        Pattern::Wildcard(_) | Pattern::Binding(_, _) | Pattern::Range(_, _, _) | Pattern::EnumVariant { .. } => pattern.clone(),
    }
}

fn resolve_format_pieces(pieces: &[FormatPiece], consts: &CompileTimeConstants, diags: &mut Diagnostics) -> Vec<FormatPiece> {
    pieces
        .iter()
        .map(|p| match p {
            FormatPiece::Literal(s) => FormatPiece::Literal(s.clone()),
            FormatPiece::Interpolate(e) => FormatPiece::Interpolate(Box::new(resolve_expr(e, consts, diags))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ast::{FunctionBody, FunctionDecl, NodeId, Param, TypeRef};
    use minz_diagnostics::Position;
    use minz_entity::EntityRef;

    fn id(n: u32) -> NodeId {
        NodeId::new(n as usize)
    }

    fn flag(name: &str) -> Expr {
        Expr::new(id(0), ExprKind::Identifier(name.into()), Position::synthetic())
    }

    fn lit(n: u64) -> Expr {
        Expr::new(id(0), ExprKind::IntLiteral(n), Position::synthetic())
    }

    #[test]
    fn picks_the_branch_matching_the_active_target() {
        let consts = CompileTimeConstants::for_target("cpm", false);
        let compile_if = Expr::new(
            id(1),
            ExprKind::CompileIf {
                branches: vec![(flag("TARGET_SPECTRUM"), lit(1)), (flag("TARGET_CPM"), lit(2))],
                else_branch: Some(Box::new(lit(3))),
            },
            Position::synthetic(),
        );
        let mut module = Module::new(None);
        module.decls.push(Decl::Function(FunctionDecl {
            name: "f".into(),
            params: vec![],
            ret: TypeRef::Named("u8".into(), Position::synthetic()),
            body: FunctionBody { stmts: vec![], tail: Some(compile_if) },
            is_pub: false,
            is_interrupt: false,
            pos: Position::synthetic(),
        }));
        let mut diags = Diagnostics::new();
        resolve_module(&mut module, &consts, &mut diags);
        assert!(diags.is_empty());
        let Decl::Function(f) = &module.decls[0] else { unreachable!() };
        match f.body.tail.as_ref().unwrap().kind {
            ExprKind::IntLiteral(n) => assert_eq!(n, 2),
            ref other => panic!("expected the cpm branch's literal, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_else_when_no_branch_matches() {
        let consts = CompileTimeConstants::for_target("generic", false);
        let compile_if = Expr::new(
            id(1),
            ExprKind::CompileIf { branches: vec![(flag("TARGET_SPECTRUM"), lit(1))], else_branch: Some(Box::new(lit(9))) },
            Position::synthetic(),
        );
        let resolved = resolve_expr(&compile_if, &consts, &mut Diagnostics::new());
        match resolved.kind {
            ExprKind::IntLiteral(n) => assert_eq!(n, 9),
            other => panic!("expected else branch, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_condition_form_is_diagnosed_and_falls_back_to_first_branch() {
        let consts = CompileTimeConstants::for_target("generic", false);
        // A non-boolean, non-identifier condition is not a supported
        // `@if` form (only literals/identifiers/!/&&/|| are).
        let bad_cond = Expr::new(id(2), ExprKind::IntLiteral(42), Position::synthetic());
        let compile_if = Expr::new(id(1), ExprKind::CompileIf { branches: vec![(bad_cond, lit(7))], else_branch: None }, Position::synthetic());
        let mut diags = Diagnostics::new();
        let resolved = resolve_expr(&compile_if, &consts, &mut diags);
        assert!(!diags.is_empty());
        match resolved.kind {
            ExprKind::IntLiteral(n) => assert_eq!(n, 7),
            other => panic!("expected fallback to first branch, got {other:?}"),
        }
    }

    #[test]
    fn resolves_a_compile_if_nested_inside_a_binary_operand() {
        let consts = CompileTimeConstants::for_target("spectrum", false);
        let compile_if = Expr::new(
            id(1),
            ExprKind::CompileIf { branches: vec![(flag("TARGET_SPECTRUM"), lit(10))], else_branch: Some(Box::new(lit(20))) },
            Position::synthetic(),
        );
        let binary = Expr::new(id(2), ExprKind::Binary(minz_ast::BinOp::Add, Box::new(compile_if), Box::new(lit(1))), Position::synthetic());
        let resolved = resolve_expr(&binary, &consts, &mut Diagnostics::new());
        match resolved.kind {
            ExprKind::Binary(_, lhs, _) => assert!(matches!(lhs.kind, ExprKind::IntLiteral(10))),
            other => panic!("expected Binary, got {other:?}"),
        }
    }
}
