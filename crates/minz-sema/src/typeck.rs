//! The Type Checker (spec §4.2) and the `TypeRef -> Type` resolver.
//!
//! Every expression is visited exactly once; the result is recorded
//! in a [`TypeTable`] side map keyed by [`minz_ast::NodeId`] rather
//! than written back into the (immutable) AST node.

use rustc_hash::FxHashMap;
use std::rc::Rc;

use minz_ast::{BinOp, Expr, ExprKind, NodeId, Param, TypeRef, UnOp};
use minz_diagnostics::{Diagnostic, Diagnostics, Position};
use minz_entity::SecondaryMap;
use minz_types::{assignable, Assignability, BitStructDef, EnumDef, FunctionSig, InterfaceDef, Mutability, StructDef, Type};

use crate::scope::ScopeManager;
use crate::symbol::Symbol;

#[derive(Default)]
pub struct TypeTable(SecondaryMap<NodeId, Option<Type>>);

impl TypeTable {
    pub fn new() -> Self {
        TypeTable(SecondaryMap::with_default(None))
    }

    pub fn get(&self, id: NodeId) -> Option<&Type> {
        self.0.get(id).as_ref()
    }

    pub fn insert(&mut self, id: NodeId, ty: Type) {
        self.0.set(id, Some(ty));
    }
}

/// Per-call-site resolved target, recorded for `minz_mir::builder` so
/// it never has to re-run overload resolution: a plain `Call` against
/// a single function or an already-disambiguated `OverloadSet` member
/// resolves to the mangled symbol it must `CALL` (§4.1, §4.3).
#[derive(Default)]
pub struct CallTargets(FxHashMap<NodeId, String>);

impl CallTargets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&str> {
        self.0.get(&id).map(|s| s.as_str())
    }

    pub fn insert(&mut self, id: NodeId, mangled: String) {
        self.0.insert(id, mangled);
    }
}

/// Declared named types and compile-time constants visible for
/// `TypeRef` resolution and array-length evaluation.
#[derive(Default)]
pub struct TypeRegistry {
    pub structs: FxHashMap<String, Rc<StructDef>>,
    pub enums: FxHashMap<String, Rc<EnumDef>>,
    pub interfaces: FxHashMap<String, Rc<InterfaceDef>>,
    pub bitstructs: FxHashMap<String, Rc<BitStructDef>>,
    /// Resolved integer constants, used for named array lengths
    /// (`[SIZE]u8`) and `@if` conditions over `TARGET_*` flags.
    pub int_consts: FxHashMap<String, i64>,
    pub bool_consts: FxHashMap<String, bool>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, tr: &TypeRef) -> Result<Type, Diagnostic> {
        match tr {
            TypeRef::Named(name, pos) => self.resolve_named(name, *pos),
            TypeRef::Array(elem, len, pos) => {
                let elem_ty = self.resolve(elem)?;
                let n = match len {
                    minz_ast::ArrayLen::Literal(n) => *n,
                    minz_ast::ArrayLen::Const(name) => {
                        *self.int_consts.get(name).ok_or_else(|| Diagnostic::UndefinedIdentifier {
                            name: name.clone(),
                            pos: *pos,
                            suggestion: Default::default(),
                        })? as u32
                    }
                };
                Ok(Type::Array(Rc::new(elem_ty), n))
            }
            TypeRef::Pointer(pointee, mutable, _pos) => {
                let pointee_ty = self.resolve(pointee)?;
                Ok(Type::Pointer(Rc::new(pointee_ty), if *mutable { Mutability::Mut } else { Mutability::Const }))
            }
            TypeRef::Function(params, ret, _pos) => {
                let params = params.iter().map(|p| self.resolve(p)).collect::<Result<Vec<_>, _>>()?;
                let ret = self.resolve(ret)?;
                Ok(Type::Function(Rc::new(FunctionSig { params, ret })))
            }
            TypeRef::ErrorUnion(ok, err_name, pos) => {
                let ok_ty = self.resolve(ok)?;
                let err = self.enums.get(err_name).cloned().ok_or_else(|| Diagnostic::UndefinedIdentifier {
                    name: err_name.clone(),
                    pos: *pos,
                    suggestion: Default::default(),
                })?;
                Ok(Type::ErrorUnion(Rc::new(ok_ty), err))
            }
            TypeRef::Inferred(pos) => Err(Diagnostic::TypeMismatch {
                expected: "an explicit type".into(),
                actual: "`_` in a context requiring inference from a value".into(),
                pos: *pos,
            }),
        }
    }

    fn resolve_named(&self, name: &str, pos: Position) -> Result<Type, Diagnostic> {
        Ok(match name {
            "u8" => Type::U8,
            "u16" => Type::U16,
            "u24" => Type::U24,
            "i8" => Type::I8,
            "i16" => Type::I16,
            "i24" => Type::I24,
            "bool" => Type::Bool,
            "void" => Type::Void,
            "string" => Type::String,
            "lstring" => Type::LString,
            "f8.8" => Type::Fixed(minz_types::FixedPoint::F8_8),
            "f16.8" => Type::Fixed(minz_types::FixedPoint::F16_8),
            "f8.16" => Type::Fixed(minz_types::FixedPoint::F8_16),
            "f.8" => Type::Fixed(minz_types::FixedPoint::F_8),
            "f.16" => Type::Fixed(minz_types::FixedPoint::F_16),
            _ => {
                if let Some(s) = self.structs.get(name) {
                    Type::Struct(s.clone())
                } else if let Some(e) = self.enums.get(name) {
                    Type::Enum(e.clone())
                } else if let Some(i) = self.interfaces.get(name) {
                    Type::Interface(i.clone())
                } else if let Some(b) = self.bitstructs.get(name) {
                    Type::BitStruct(b.clone())
                } else {
                    return Err(Diagnostic::UndefinedIdentifier { name: name.to_string(), pos, suggestion: Default::default() });
                }
            }
        })
    }
}

/// Widens `a`/`b` to a common arithmetic type per §4.2's numeric
/// promotion rule: mixed-width arithmetic promotes to the wider
/// operand's type; mixed signedness requires an explicit cast.
fn promote(a: &Type, b: &Type, pos: Position) -> Result<Type, Diagnostic> {
    if a == b {
        return Ok(a.clone());
    }
    match (assignable(a, b), assignable(b, a)) {
        (Assignability::Widening, _) => Ok(b.clone()),
        (_, Assignability::Widening) => Ok(a.clone()),
        _ => Err(Diagnostic::TypeMismatch { expected: a.to_string(), actual: b.to_string(), pos }),
    }
}

pub struct TypeChecker<'a> {
    pub registry: &'a TypeRegistry,
    pub types: TypeTable,
    pub call_targets: CallTargets,
    pub diags: Diagnostics,
}

impl<'a> TypeChecker<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        TypeChecker { registry, types: TypeTable::new(), call_targets: CallTargets::new(), diags: Diagnostics::new() }
    }

    pub fn check_function_params(&mut self, params: &[Param]) -> Result<Vec<Type>, Diagnostic> {
        params.iter().map(|p| self.registry.resolve(&p.ty)).collect()
    }

    /// Check `expr` in `scope`, recording its resolved type in the
    /// `TypeTable` and returning it.
    pub fn check_expr(&mut self, expr: &Expr, scope: &ScopeManager) -> Result<Type, Diagnostic> {
        let ty = self.check_expr_inner(expr, scope)?;
        self.types.insert(expr.id, ty.clone());
        Ok(ty)
    }

    fn check_expr_inner(&mut self, expr: &Expr, scope: &ScopeManager) -> Result<Type, Diagnostic> {
        match &expr.kind {
            ExprKind::IntLiteral(v) => Ok(Type::smallest_unsigned_for(*v)),
            ExprKind::BoolLiteral(_) => Ok(Type::Bool),
            ExprKind::StringLiteral(_) => Ok(Type::String),
            ExprKind::InterpolatedString(pieces) => {
                for p in pieces {
                    if let minz_ast::FormatPiece::Interpolate(e) = p {
                        self.check_expr(e, scope)?;
                    }
                }
                Ok(Type::String)
            }
            ExprKind::Identifier(name) => match scope.lookup(name) {
                Some(Symbol::Variable(v)) => Ok(v.ty.clone()),
                Some(Symbol::Parameter(p)) => Ok(p.ty.clone()),
                Some(Symbol::Constant(c)) => Ok(c.ty.clone()),
                Some(Symbol::Function(f)) => Ok(Type::Function(Rc::new(FunctionSig { params: f.params.clone(), ret: f.ret.clone() }))),
                Some(Symbol::OverloadSet(_)) => Err(Diagnostic::NotCallable { pos: expr.pos }),
                Some(Symbol::Type(_)) | Some(Symbol::InterfaceMethod(_)) | Some(Symbol::Module(_)) | None => {
                    Err(Diagnostic::UndefinedIdentifier {
                        name: name.clone(),
                        pos: expr.pos,
                        suggestion: minz_diagnostics::suggest_closest(name, scope.visible_names()),
                    })
                }
            },
            ExprKind::Unary(op, inner) => {
                let t = self.check_expr(inner, scope)?;
                match op {
                    UnOp::Neg => {
                        if !t.is_integer() && !matches!(t, Type::Fixed(_)) {
                            return Err(Diagnostic::TypeMismatch { expected: "a numeric type".into(), actual: t.to_string(), pos: expr.pos });
                        }
                        Ok(t)
                    }
                    UnOp::Not => {
                        if t != Type::Bool {
                            return Err(Diagnostic::NonBooleanCondition { actual: t.to_string(), pos: expr.pos });
                        }
                        Ok(Type::Bool)
                    }
                    UnOp::AddressOf => Ok(Type::Pointer(Rc::new(t), Mutability::Const)),
                    UnOp::Deref => match t {
                        Type::Pointer(pointee, _) => Ok((*pointee).clone()),
                        _ => Err(Diagnostic::TypeMismatch { expected: "a pointer type".into(), actual: t.to_string(), pos: expr.pos }),
                    },
                }
            }
            ExprKind::Binary(op, lhs, rhs) => self.check_binary(*op, lhs, rhs, scope, expr.pos),
            ExprKind::Try(inner) => {
                let t = self.check_expr(inner, scope)?;
                match t {
                    Type::ErrorUnion(ok, _) => Ok((*ok).clone()),
                    _ => Err(Diagnostic::TypeMismatch { expected: "an error-union type".into(), actual: t.to_string(), pos: expr.pos }),
                }
            }
            ExprKind::Call { callee, args } => self.check_call(callee, args, scope, expr.pos),
            ExprKind::MethodCall { receiver, args, .. } => {
                self.check_expr(receiver, scope)?;
                for a in args {
                    self.check_expr(a, scope)?;
                }
                // Concrete resolution happens in `minz_sema::interface`
                // once the receiver's concrete type is known; here we
                // only validate the operands typecheck.
                Ok(Type::Void)
            }
            ExprKind::Field { base, field } => {
                let base_ty = self.check_expr(base, scope)?;
                match &base_ty {
                    Type::Struct(s) => s
                        .fields
                        .iter()
                        .find(|(n, _)| n == field)
                        .map(|(_, t)| t.clone())
                        .ok_or_else(|| Diagnostic::FieldNotFound { field: field.clone(), ty: base_ty.to_string(), pos: expr.pos }),
                    _ => Err(Diagnostic::NotAStruct { ty: base_ty.to_string(), pos: expr.pos }),
                }
            }
            ExprKind::Index { base, index } => {
                let base_ty = self.check_expr(base, scope)?;
                let idx_ty = self.check_expr(index, scope)?;
                if !idx_ty.is_integer() {
                    return Err(Diagnostic::TypeMismatch { expected: "an integer index".into(), actual: idx_ty.to_string(), pos: expr.pos });
                }
                match base_ty {
                    Type::Array(elem, _) => Ok((*elem).clone()),
                    Type::Pointer(pointee, _) => Ok((*pointee).clone()),
                    other => Err(Diagnostic::NotAnArray { ty: other.to_string(), pos: expr.pos }),
                }
            }
            ExprKind::Cast { expr: inner, ty } => {
                let from = self.check_expr(inner, scope)?;
                let to = self.registry.resolve(ty)?;
                check_cast(&from, &to, expr.pos)?;
                Ok(to)
            }
            ExprKind::ArrayLiteral(elems) => {
                let mut elem_ty = None;
                for e in elems {
                    let t = self.check_expr(e, scope)?;
                    elem_ty = Some(match elem_ty {
                        None => t,
                        Some(prev) => promote(&prev, &t, e.pos)?,
                    });
                }
                let elem_ty = elem_ty.unwrap_or(Type::U8);
                Ok(Type::Array(Rc::new(elem_ty), elems.len() as u32))
            }
            ExprKind::StructLiteral { type_name, fields } => {
                let def = self.registry.structs.get(type_name).cloned().ok_or_else(|| Diagnostic::UndefinedIdentifier {
                    name: type_name.clone(),
                    pos: expr.pos,
                    suggestion: Default::default(),
                })?;
                for f in fields {
                    let field_ty = def.fields.iter().find(|(n, _)| n == &f.name).map(|(_, t)| t.clone());
                    let value_ty = self.check_expr(&f.value, scope)?;
                    match field_ty {
                        Some(expected) => {
                            if assignable(&value_ty, &expected) == Assignability::No {
                                return Err(Diagnostic::TypeMismatch { expected: expected.to_string(), actual: value_ty.to_string(), pos: f.value.pos });
                            }
                        }
                        None => return Err(Diagnostic::FieldNotFound { field: f.name.clone(), ty: type_name.clone(), pos: f.value.pos }),
                    }
                }
                Ok(Type::Struct(def))
            }
            ExprKind::Lambda { params, ret, body } => {
                let param_tys = params
                    .iter()
                    .map(|p| match &p.ty {
                        Some(t) => self.registry.resolve(t),
                        None => Ok(Type::U8), // untyped lambda params default to u8 until inferred at a call site
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let ret_ty = match ret {
                    Some(t) => self.registry.resolve(t)?,
                    None => self.check_expr(body, scope)?,
                };
                Ok(Type::Function(Rc::new(FunctionSig { params: param_tys, ret: ret_ty })))
            }
            ExprKind::Curry { lambda, value } => {
                let lam_ty = self.check_expr(lambda, scope)?;
                self.check_expr(value, scope)?;
                match lam_ty {
                    Type::Function(sig) if !sig.params.is_empty() => {
                        Ok(Type::Function(Rc::new(FunctionSig { params: sig.params[1..].to_vec(), ret: sig.ret.clone() })))
                    }
                    other => Err(Diagnostic::TypeMismatch { expected: "a function with at least one parameter".into(), actual: other.to_string(), pos: expr.pos }),
                }
            }
            ExprKind::Match { scrutinee, arms } => {
                self.check_expr(scrutinee, scope)?;
                let mut result = None;
                for arm in arms {
                    let t = self.check_expr(&arm.body, scope)?;
                    result = Some(match result {
                        None => t,
                        Some(prev) => promote(&prev, &t, arm.pos)?,
                    });
                }
                Ok(result.unwrap_or(Type::Void))
            }
            ExprKind::Block(_, tail) => match tail {
                Some(e) => self.check_expr(e, scope),
                None => Ok(Type::Void),
            },
            ExprKind::If { cond, then_branch, else_branch } => {
                let cond_ty = self.check_expr(cond, scope)?;
                if cond_ty != Type::Bool {
                    return Err(Diagnostic::NonBooleanCondition { actual: cond_ty.to_string(), pos: cond.pos });
                }
                let then_ty = self.check_expr(then_branch, scope)?;
                match else_branch {
                    Some(e) => {
                        let else_ty = self.check_expr(e, scope)?;
                        promote(&then_ty, &else_ty, expr.pos)
                    }
                    None => Ok(Type::Void),
                }
            }
            ExprKind::IterChain { source, stages } => {
                let _src_ty = self.check_expr(source, scope)?;
                for stage in stages {
                    match stage {
                        minz_ast::IterStage::Map(f) | minz_ast::IterStage::Filter(f) | minz_ast::IterStage::ForEach(f) => {
                            self.check_expr(f, scope)?;
                        }
                    }
                }
                Ok(Type::Void)
            }
            ExprKind::Print { format } => {
                for p in format {
                    if let minz_ast::FormatPiece::Interpolate(e) = p {
                        self.check_expr(e, scope)?;
                    }
                }
                Ok(Type::Void)
            }
            ExprKind::ToString(inner) => {
                self.check_expr(inner, scope)?;
                Ok(Type::String)
            }
            ExprKind::Concat(pieces) => {
                for p in pieces {
                    self.check_expr(p, scope)?;
                }
                Ok(Type::String)
            }
            ExprKind::MinzBlock(_) | ExprKind::LuaBlock(_) => Ok(Type::Void),
            ExprKind::DefineTemplate { args, .. } => {
                for a in args {
                    self.check_expr(a, scope)?;
                }
                Ok(Type::Void)
            }
            ExprKind::CompileIf { branches, else_branch } => {
                let mut result = None;
                for (_, body) in branches {
                    let t = self.check_expr(body, scope)?;
                    result = Some(t);
                }
                if let Some(e) = else_branch {
                    result = Some(self.check_expr(e, scope)?);
                }
                Ok(result.unwrap_or(Type::Void))
            }
        }
    }

    fn check_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, scope: &ScopeManager, pos: Position) -> Result<Type, Diagnostic> {
        let lt = self.check_expr(lhs, scope)?;
        let rt = self.check_expr(rhs, scope)?;
        use BinOp::*;
        match op {
            Add | Sub => {
                // Pointer arithmetic (§4.2): `*T + integer` -> `*T`;
                // `*T - *T` -> the pointee's address-width integer.
                if let Type::Pointer(pointee, m) = &lt {
                    if rt.is_integer() {
                        return Ok(Type::Pointer(pointee.clone(), *m));
                    }
                    if op == Sub {
                        if let Type::Pointer(other_pointee, _) = &rt {
                            if pointee == other_pointee {
                                return Ok(Type::U16);
                            }
                        }
                    }
                }
                arith(&lt, &rt, pos)
            }
            Mul | Div | Mod | And | Or | Xor | Shl | Shr => arith(&lt, &rt, pos),
            Eq | Ne | Lt | Le | Gt | Ge => {
                promote(&lt, &rt, pos)?;
                Ok(Type::Bool)
            }
            LogicalAnd | LogicalOr => {
                if lt != Type::Bool {
                    return Err(Diagnostic::NonBooleanCondition { actual: lt.to_string(), pos: lhs.pos });
                }
                if rt != Type::Bool {
                    return Err(Diagnostic::NonBooleanCondition { actual: rt.to_string(), pos: rhs.pos });
                }
                Ok(Type::Bool)
            }
            ErrorCoalesce => match lt {
                Type::ErrorUnion(ok, _) => promote(&ok, &rt, pos),
                _ => Err(Diagnostic::TypeMismatch { expected: "an error-union type".into(), actual: lt.to_string(), pos: lhs.pos }),
            },
        }
    }

    fn check_call(&mut self, callee: &Expr, args: &[Expr], scope: &ScopeManager, pos: Position) -> Result<Type, Diagnostic> {
        let arg_types: Vec<Type> = args.iter().map(|a| self.check_expr(a, scope)).collect::<Result<_, _>>()?;
        if let ExprKind::Identifier(name) = &callee.kind {
            match scope.lookup(name) {
                Some(Symbol::Function(f)) => {
                    if f.params.len() != arg_types.len() {
                        return Err(Diagnostic::WrongArity { expected: f.params.len(), actual: arg_types.len(), pos });
                    }
                    for (p, a) in f.params.iter().zip(arg_types.iter()) {
                        if assignable(a, p) == Assignability::No {
                            return Err(Diagnostic::TypeMismatch { expected: p.to_string(), actual: a.to_string(), pos });
                        }
                    }
                    self.call_targets.insert(callee.id, f.mangled_name.clone());
                    return Ok(f.ret.clone());
                }
                Some(Symbol::OverloadSet(set)) => {
                    let chosen = crate::overload::resolve(&set.borrow(), &arg_types, pos)?;
                    self.call_targets.insert(callee.id, chosen.mangled_name.clone());
                    return Ok(chosen.ret.clone());
                }
                Some(_) => {}
                None => {
                    return Err(Diagnostic::UndefinedIdentifier {
                        name: name.clone(),
                        pos,
                        suggestion: minz_diagnostics::suggest_closest(name, scope.visible_names()),
                    })
                }
            }
        }
        let callee_ty = self.check_expr(callee, scope)?;
        match callee_ty {
            Type::Function(sig) => {
                if sig.params.len() != arg_types.len() {
                    return Err(Diagnostic::WrongArity { expected: sig.params.len(), actual: arg_types.len(), pos });
                }
                Ok(sig.ret.clone())
            }
            _ => Err(Diagnostic::NotCallable { pos }),
        }
    }
}

fn arith(lt: &Type, rt: &Type, pos: Position) -> Result<Type, Diagnostic> {
    if !(lt.is_integer() || matches!(lt, Type::Fixed(_))) {
        return Err(Diagnostic::TypeMismatch { expected: "a numeric type".into(), actual: lt.to_string(), pos });
    }
    if !(rt.is_integer() || matches!(rt, Type::Fixed(_))) {
        return Err(Diagnostic::TypeMismatch { expected: "a numeric type".into(), actual: rt.to_string(), pos });
    }
    promote(lt, rt, pos)
}

/// `as` cast rules (§4.2): integer<->integer (width change explicit),
/// pointer<->pointer (no-op), integer<->pointer (allowed, caller
/// should warn via `IntegerCastOverlapsSign` when signs differ).
fn check_cast(from: &Type, to: &Type, pos: Position) -> Result<(), Diagnostic> {
    let ok = (from.is_integer() && to.is_integer())
        || (from.is_pointer() && to.is_pointer())
        || (from.is_integer() && to.is_pointer())
        || (from.is_pointer() && to.is_integer())
        || (matches!(from, Type::Fixed(_)) && to.is_integer())
        || (from.is_integer() && matches!(to, Type::Fixed(_)))
        || (*from == Type::Bool && to.is_integer())
        || (from.is_integer() && *to == Type::Bool);
    if ok {
        Ok(())
    } else {
        Err(Diagnostic::InvalidCast { from: from.to_string(), to: to.to_string(), pos })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ast::{Expr, ExprKind};
    use minz_entity::EntityRef;

    fn node(id: u32, kind: ExprKind) -> Expr {
        Expr::new(NodeId::new(id as usize), kind, Position::synthetic())
    }

    #[test]
    fn literal_inference_boundaries() {
        let reg = TypeRegistry::new();
        let scope = ScopeManager::new();
        let mut tc = TypeChecker::new(&reg);
        let e255 = node(0, ExprKind::IntLiteral(255));
        assert_eq!(tc.check_expr(&e255, &scope).unwrap(), Type::U8);
        let e256 = node(1, ExprKind::IntLiteral(256));
        assert_eq!(tc.check_expr(&e256, &scope).unwrap(), Type::U16);
    }

    #[test]
    fn undefined_identifier_suggests_near_miss() {
        let reg = TypeRegistry::new();
        let mut scope = ScopeManager::new();
        scope.define("print", Symbol::Function(Rc::new(crate::symbol::FunctionSymbol {
            name: "print".into(), params: vec![], ret: Type::Void, mangled_name: "print".into(), is_pub: false, is_interrupt: false,
        })), Position::synthetic()).unwrap();
        let mut tc = TypeChecker::new(&reg);
        let e = node(0, ExprKind::Identifier("prnt".into()));
        let err = tc.check_expr(&e, &scope).unwrap_err();
        match err {
            Diagnostic::UndefinedIdentifier { suggestion, .. } => assert_eq!(suggestion.0.as_deref(), Some("print")),
            _ => panic!("wrong diagnostic"),
        }
    }

    #[test]
    fn logical_and_requires_bool_operands() {
        let reg = TypeRegistry::new();
        let scope = ScopeManager::new();
        let mut tc = TypeChecker::new(&reg);
        let lhs = node(0, ExprKind::IntLiteral(1));
        let rhs = node(1, ExprKind::BoolLiteral(true));
        let e = node(2, ExprKind::Binary(BinOp::LogicalAnd, Box::new(lhs), Box::new(rhs)));
        let err = tc.check_expr(&e, &scope).unwrap_err();
        assert_eq!(err.kind_str(), "NonBooleanCondition");
    }

    #[test]
    fn invalid_cast_struct_to_bool_rejected() {
        let def = Rc::new(StructDef { name: "Point".into(), fields: vec![("x".into(), Type::U8)] });
        assert!(matches!(check_cast(&Type::Struct(def), &Type::Bool, Position::synthetic()), Err(Diagnostic::InvalidCast { .. })));
    }

    #[test]
    fn u8_u8_wraps_no_promotion_width_change() {
        // u8 + u8 stays u8 per §8.3 (wraps modulo 256 at codegen, not
        // promoted to a wider type here).
        let reg = TypeRegistry::new();
        let scope = ScopeManager::new();
        let mut tc = TypeChecker::new(&reg);
        let lhs = node(0, ExprKind::IntLiteral(200));
        let rhs = node(1, ExprKind::IntLiteral(100));
        let e = node(2, ExprKind::Binary(BinOp::Add, Box::new(lhs), Box::new(rhs)));
        assert_eq!(tc.check_expr(&e, &scope).unwrap(), Type::U8);
    }
}
