//! The Lambda Transformer (spec §4.4).
//!
//! Every lambda expression is hoisted to a uniquely named top-level
//! function `parent$lambda_N`. No implicit variable capture is
//! supported: referencing an enclosing non-global binding inside a
//! lambda body is `LambdaCaptureNotSupported` (the escape hatch is
//! explicit `@curry`, see `crate::curry`).

use std::collections::HashSet;

use minz_ast::{Decl, Expr, ExprKind, FunctionBody, FunctionDecl, LambdaParam, Param, TypeRef};
use minz_diagnostics::{Diagnostic, Position};

/// One lambda found and hoisted out of a function body.
pub struct HoistedLambda {
    pub decl: FunctionDecl,
    /// The name used as a `Function`-reference replacing the lambda
    /// expression at its original call site.
    pub name: String,
}

/// Walks `body`, hoisting every `Lambda` expression it finds (and
/// recursively, every lambda nested inside an already-hoisted lambda
/// body) into top-level functions named `parent$lambda_N` with `N`
/// increasing per enclosing function. `locals` is the set of
/// non-global names already bound in the enclosing function (its
/// parameters and `let` bindings up to this point); referencing any
/// of them from inside a lambda is rejected.
pub struct LambdaTransformer<'a> {
    parent_name: &'a str,
    next_index: u32,
    pub hoisted: Vec<HoistedLambda>,
}

impl<'a> LambdaTransformer<'a> {
    pub fn new(parent_name: &'a str) -> Self {
        LambdaTransformer { parent_name, next_index: 0, hoisted: Vec::new() }
    }

    /// Rewrite `expr` in place conceptually: returns a new `Expr` tree
    /// with every lambda replaced by an `Identifier` referencing its
    /// hoisted function name, recording each hoisted function in
    /// `self.hoisted`. `locals` is consulted to detect illegal
    /// captures.
    pub fn transform(&mut self, expr: &Expr, locals: &HashSet<String>) -> Result<Expr, Diagnostic> {
        match &expr.kind {
            ExprKind::Lambda { params, ret, body } => {
                self.check_no_capture(body, params, locals)?;
                let name = crate::mangle::mangle_lambda(self.parent_name, self.next_index);
                self.next_index += 1;
                let fn_params: Vec<Param> = params
                    .iter()
                    .map(|p| Param { name: p.name.clone(), ty: p.ty.clone().unwrap_or(TypeRef::Named("u8".into(), p.pos)), pos: p.pos })
                    .collect();
                let ret_ty = ret.clone().unwrap_or(TypeRef::Inferred(expr.pos));
                let decl = FunctionDecl {
                    name: name.clone(),
                    params: fn_params,
                    ret: ret_ty,
                    body: FunctionBody { stmts: vec![], tail: Some((**body).clone()) },
                    is_pub: false,
                    is_interrupt: false,
                    pos: expr.pos,
                };
                self.hoisted.push(HoistedLambda { decl, name: name.clone() });
                Ok(Expr::new(expr.id, ExprKind::Identifier(name), expr.pos))
            }
            ExprKind::Call { callee, args } => {
                let callee = Box::new(self.transform(callee, locals)?);
                let args = args.iter().map(|a| self.transform(a, locals)).collect::<Result<_, _>>()?;
                Ok(Expr::new(expr.id, ExprKind::Call { callee, args }, expr.pos))
            }
            ExprKind::IterChain { source, stages } => {
                let source = Box::new(self.transform(source, locals)?);
                let stages = stages
                    .iter()
                    .map(|s| {
                        Ok(match s {
                            minz_ast::IterStage::Map(f) => minz_ast::IterStage::Map(Box::new(self.transform(f, locals)?)),
                            minz_ast::IterStage::Filter(f) => minz_ast::IterStage::Filter(Box::new(self.transform(f, locals)?)),
                            minz_ast::IterStage::ForEach(f) => minz_ast::IterStage::ForEach(Box::new(self.transform(f, locals)?)),
                        })
                    })
                    .collect::<Result<_, Diagnostic>>()?;
                Ok(Expr::new(expr.id, ExprKind::IterChain { source, stages }, expr.pos))
            }
            ExprKind::Curry { lambda, value } => {
                // @curry's first argument is allowed to reference the
                // captured binding explicitly; only the lambda body's
                // *implicit* references are checked, which happens
                // when `minz_mir::builder::lower_curry` clones it.
                let value = Box::new(self.transform(value, locals)?);
                Ok(Expr::new(expr.id, ExprKind::Curry { lambda: lambda.clone(), value }, expr.pos))
            }
            ExprKind::Unary(op, inner) => {
                let inner = Box::new(self.transform(inner, locals)?);
                Ok(Expr::new(expr.id, ExprKind::Unary(*op, inner), expr.pos))
            }
            ExprKind::Try(inner) => {
                let inner = Box::new(self.transform(inner, locals)?);
                Ok(Expr::new(expr.id, ExprKind::Try(inner), expr.pos))
            }
            ExprKind::ToString(inner) => {
                let inner = Box::new(self.transform(inner, locals)?);
                Ok(Expr::new(expr.id, ExprKind::ToString(inner), expr.pos))
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let lhs = Box::new(self.transform(lhs, locals)?);
                let rhs = Box::new(self.transform(rhs, locals)?);
                Ok(Expr::new(expr.id, ExprKind::Binary(*op, lhs, rhs), expr.pos))
            }
            ExprKind::MethodCall { receiver, method, args } => {
                let receiver = Box::new(self.transform(receiver, locals)?);
                let args = args.iter().map(|a| self.transform(a, locals)).collect::<Result<_, _>>()?;
                Ok(Expr::new(expr.id, ExprKind::MethodCall { receiver, method: method.clone(), args }, expr.pos))
            }
            ExprKind::Field { base, field } => {
                let base = Box::new(self.transform(base, locals)?);
                Ok(Expr::new(expr.id, ExprKind::Field { base, field: field.clone() }, expr.pos))
            }
            ExprKind::Index { base, index } => {
                let base = Box::new(self.transform(base, locals)?);
                let index = Box::new(self.transform(index, locals)?);
                Ok(Expr::new(expr.id, ExprKind::Index { base, index }, expr.pos))
            }
            ExprKind::Cast { expr: inner, ty } => {
                let inner = Box::new(self.transform(inner, locals)?);
                Ok(Expr::new(expr.id, ExprKind::Cast { expr: inner, ty: ty.clone() }, expr.pos))
            }
            ExprKind::ArrayLiteral(items) => {
                let items = items.iter().map(|e| self.transform(e, locals)).collect::<Result<_, _>>()?;
                Ok(Expr::new(expr.id, ExprKind::ArrayLiteral(items), expr.pos))
            }
            ExprKind::StructLiteral { type_name, fields } => {
                let fields = fields
                    .iter()
                    .map(|f| Ok(minz_ast::Field { name: f.name.clone(), value: self.transform(&f.value, locals)? }))
                    .collect::<Result<_, Diagnostic>>()?;
                Ok(Expr::new(expr.id, ExprKind::StructLiteral { type_name: type_name.clone(), fields }, expr.pos))
            }
            ExprKind::If { cond, then_branch, else_branch } => {
                let cond = Box::new(self.transform(cond, locals)?);
                let then_branch = Box::new(self.transform(then_branch, locals)?);
                let else_branch = else_branch.as_ref().map(|e| self.transform(e, locals)).transpose()?.map(Box::new);
                Ok(Expr::new(expr.id, ExprKind::If { cond, then_branch, else_branch }, expr.pos))
            }
            ExprKind::Block(stmts, tail) => {
                let mut inner = locals.clone();
                let stmts = stmts.iter().map(|s| self.transform_stmt(s, &mut inner)).collect::<Result<_, _>>()?;
                let tail = tail.as_ref().map(|t| self.transform(t, &inner)).transpose()?.map(Box::new);
                Ok(Expr::new(expr.id, ExprKind::Block(stmts, tail), expr.pos))
            }
            ExprKind::Match { scrutinee, arms } => {
                let scrutinee = Box::new(self.transform(scrutinee, locals)?);
                let arms = arms
                    .iter()
                    .map(|arm| {
                        let mut inner = locals.clone();
                        bind_pattern_names(&arm.pattern, &mut inner);
                        let guard = arm.guard.as_ref().map(|g| self.transform(g, &inner)).transpose()?;
                        let body = self.transform(&arm.body, &inner)?;
                        Ok(minz_ast::MatchArm { pattern: arm.pattern.clone(), guard, body, pos: arm.pos })
                    })
                    .collect::<Result<_, Diagnostic>>()?;
                Ok(Expr::new(expr.id, ExprKind::Match { scrutinee, arms }, expr.pos))
            }
            ExprKind::Concat(pieces) => {
                let pieces = pieces.iter().map(|e| self.transform(e, locals)).collect::<Result<_, _>>()?;
                Ok(Expr::new(expr.id, ExprKind::Concat(pieces), expr.pos))
            }
            ExprKind::Print { format } => {
                let format = format.iter().map(|p| self.transform_format_piece(p, locals)).collect::<Result<_, Diagnostic>>()?;
                Ok(Expr::new(expr.id, ExprKind::Print { format }, expr.pos))
            }
            ExprKind::InterpolatedString(pieces) => {
                let pieces = pieces.iter().map(|p| self.transform_format_piece(p, locals)).collect::<Result<_, Diagnostic>>()?;
                Ok(Expr::new(expr.id, ExprKind::InterpolatedString(pieces), expr.pos))
            }
            ExprKind::CompileIf { branches, else_branch } => {
                let branches = branches
                    .iter()
                    .map(|(c, b)| Ok((self.transform(c, locals)?, self.transform(b, locals)?)))
                    .collect::<Result<_, Diagnostic>>()?;
                let else_branch = else_branch.as_ref().map(|e| self.transform(e, locals)).transpose()?.map(Box::new);
                Ok(Expr::new(expr.id, ExprKind::CompileIf { branches, else_branch }, expr.pos))
            }
            ExprKind::DefineTemplate { name, args, template } => {
                let args = args.iter().map(|a| self.transform(a, locals)).collect::<Result<_, _>>()?;
                Ok(Expr::new(expr.id, ExprKind::DefineTemplate { name: name.clone(), args, template: template.clone() }, expr.pos))
            }
            // Leaves: nothing below can syntactically contain a lambda.
            ExprKind::IntLiteral(_) | ExprKind::BoolLiteral(_) | ExprKind::StringLiteral(_) | ExprKind::Identifier(_) | ExprKind::MinzBlock(_) | ExprKind::LuaBlock(_) => {
                Ok(expr.clone())
            }
        }
    }

    fn transform_format_piece(&mut self, piece: &minz_ast::FormatPiece, locals: &HashSet<String>) -> Result<minz_ast::FormatPiece, Diagnostic> {
        Ok(match piece {
            minz_ast::FormatPiece::Literal(s) => minz_ast::FormatPiece::Literal(s.clone()),
            minz_ast::FormatPiece::Interpolate(e) => minz_ast::FormatPiece::Interpolate(Box::new(self.transform(e, locals)?)),
        })
    }

    fn check_no_capture(&self, body: &Expr, params: &[LambdaParam], locals: &HashSet<String>) -> Result<(), Diagnostic> {
        let bound: HashSet<&str> = params.iter().map(|p| p.name.as_str()).collect();
        find_capture(body, &bound, locals)
    }

    /// Statement-level counterpart of [`transform`]: a lambda or iterator
    /// chain reached only through a function body's statement list (an
    /// `ExprStmt`, a loop body, …) rather than its tail expression is hoisted
    /// exactly the same way. `locals` grows with each `let` this walk passes,
    /// matching the scoping a sequential statement list actually has.
    pub fn transform_stmt(&mut self, stmt: &minz_ast::Stmt, locals: &mut HashSet<String>) -> Result<minz_ast::Stmt, Diagnostic> {
        use minz_ast::StmtKind;
        let kind = match &stmt.kind {
            StmtKind::Let { name, mutable, ty, value } => {
                let value = self.transform(value, locals)?;
                locals.insert(name.clone());
                StmtKind::Let { name: name.clone(), mutable: *mutable, ty: ty.clone(), value }
            }
            StmtKind::Assign { target, value } => {
                StmtKind::Assign { target: self.transform(target, locals)?, value: self.transform(value, locals)? }
            }
            StmtKind::CompoundAssign { op, target, value } => {
                StmtKind::CompoundAssign { op: *op, target: self.transform(target, locals)?, value: self.transform(value, locals)? }
            }
            StmtKind::ExprStmt(e) => StmtKind::ExprStmt(self.transform(e, locals)?),
            StmtKind::Return(e) => StmtKind::Return(e.as_ref().map(|e| self.transform(e, locals)).transpose()?),
            StmtKind::ForRange { var, lo, hi, body } => {
                let lo = self.transform(lo, locals)?;
                let hi = self.transform(hi, locals)?;
                let mut inner = locals.clone();
                inner.insert(var.clone());
                let body = body.iter().map(|s| self.transform_stmt(s, &mut inner)).collect::<Result<_, _>>()?;
                StmtKind::ForRange { var: var.clone(), lo, hi, body }
            }
            StmtKind::While { cond, body } => {
                let cond = self.transform(cond, locals)?;
                let mut inner = locals.clone();
                let body = body.iter().map(|s| self.transform_stmt(s, &mut inner)).collect::<Result<_, _>>()?;
                StmtKind::While { cond, body }
            }
            StmtKind::Loop { body } => {
                let mut inner = locals.clone();
                let body = body.iter().map(|s| self.transform_stmt(s, &mut inner)).collect::<Result<_, _>>()?;
                StmtKind::Loop { body }
            }
            StmtKind::Break => StmtKind::Break,
            StmtKind::Continue => StmtKind::Continue,
        };
        Ok(minz_ast::Stmt::new(kind, stmt.pos))
    }
}

/// Names a match pattern binds into scope for its arm's guard/body,
/// so a lambda nested there sees them as locals subject to the same
/// capture check as any other enclosing binding.
fn bind_pattern_names(pattern: &minz_ast::Pattern, locals: &mut HashSet<String>) {
    match pattern {
        minz_ast::Pattern::Binding(name, _) => {
            locals.insert(name.clone());
        }
        minz_ast::Pattern::Struct { fields, .. } => {
            for (_, sub) in fields {
                bind_pattern_names(sub, locals);
            }
        }
        minz_ast::Pattern::Wildcard(_) | minz_ast::Pattern::Literal(_, _) | minz_ast::Pattern::Range(_, _, _) | minz_ast::Pattern::EnumVariant { .. } => {}
    }
}

fn find_capture(expr: &Expr, bound: &HashSet<&str>, locals: &HashSet<String>) -> Result<(), Diagnostic> {
    match &expr.kind {
        ExprKind::Identifier(name) => {
            if !bound.contains(name.as_str()) && locals.contains(name) {
                return Err(Diagnostic::LambdaCaptureNotSupported { name: name.clone(), pos: expr.pos });
            }
            Ok(())
        }
        ExprKind::Unary(_, e) | ExprKind::Try(e) | ExprKind::ToString(e) => find_capture(e, bound, locals),
        ExprKind::Binary(_, a, b) => {
            find_capture(a, bound, locals)?;
            find_capture(b, bound, locals)
        }
        ExprKind::Call { callee, args } => {
            find_capture(callee, bound, locals)?;
            args.iter().try_for_each(|a| find_capture(a, bound, locals))
        }
        ExprKind::MethodCall { receiver, args, .. } => {
            find_capture(receiver, bound, locals)?;
            args.iter().try_for_each(|a| find_capture(a, bound, locals))
        }
        ExprKind::Field { base, .. } | ExprKind::Cast { expr: base, .. } => find_capture(base, bound, locals),
        ExprKind::Index { base, index } => {
            find_capture(base, bound, locals)?;
            find_capture(index, bound, locals)
        }
        ExprKind::If { cond, then_branch, else_branch } => {
            find_capture(cond, bound, locals)?;
            find_capture(then_branch, bound, locals)?;
            else_branch.as_ref().map_or(Ok(()), |e| find_capture(e, bound, locals))
        }
        ExprKind::Block(_, tail) => tail.as_ref().map_or(Ok(()), |e| find_capture(e, bound, locals)),
        ExprKind::ArrayLiteral(items) => items.iter().try_for_each(|e| find_capture(e, bound, locals)),
        _ => Ok(()),
    }
}

/// Runs lambda hoisting over every function body in `module`,
/// appending the hoisted functions as new top-level declarations.
pub fn hoist_module(module: &mut minz_ast::Module) -> Result<(), Diagnostic> {
    let mut new_decls = Vec::new();
    for decl in &mut module.decls {
        if let Decl::Function(f) = decl {
            let mut locals: HashSet<String> = f.params.iter().map(|p| p.name.clone()).collect();
            let mut xf = LambdaTransformer::new(&f.name);
            let new_stmts = f.body.stmts.iter().map(|s| xf.transform_stmt(s, &mut locals)).collect::<Result<_, _>>()?;
            f.body.stmts = new_stmts;
            if let Some(tail) = &f.body.tail {
                let new_tail = xf.transform(tail, &locals)?;
                f.body.tail = Some(new_tail);
            }
            for h in xf.hoisted {
                new_decls.push(Decl::Function(h.decl));
            }
        }
    }
    module.decls.extend(new_decls);
    Ok(())
}
