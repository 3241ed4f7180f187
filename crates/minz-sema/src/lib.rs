//! Semantic analysis: the Symbol & Scope Manager, Type Checker,
//! Overload Resolution, Lambda Transformer, Compile-Time Currying,
//! Interface Monomorphization, Error-Propagation Lowering, and
//! Metafunctions (spec §4.1–§4.8).
//!
//! This crate turns a parsed [`minz_ast::Module`] into a fully typed,
//! lambda-hoisted, monomorphized module plus the side tables
//! (`TypeTable`, symbol scopes, impl registry) that `minz_mir::builder`
//! consumes to emit MIR. It never fails silently: every rejection
//! becomes a [`minz_diagnostics::Diagnostic`] pushed onto the shared
//! `Diagnostics` bag, and analysis continues within the current
//! function after a fatal error to surface additional ones (§4.17).

pub mod compileif;
pub mod curry;
pub mod error_prop;
pub mod interface;
pub mod lambda;
pub mod mangle;
pub mod meta;
pub mod overload;
pub mod scope;
pub mod symbol;
pub mod typeck;

use std::rc::Rc;

use minz_ast::{Decl, Module};
use minz_diagnostics::Diagnostics;
use minz_types::{FunctionSig, Type};

use interface::ImplRegistry;
use meta::CompileTimeConstants;
use scope::ScopeManager;
use symbol::{FunctionSymbol, ParameterSymbol, VariableSymbol};
use typeck::{TypeChecker, TypeRegistry};

/// Everything the MIR builder needs that semantic analysis produced:
/// the diagnostics bag, the resolved expression types, the module's
/// top-level function symbol table (name -> mangled symbol, already
/// overload-resolved at each call site by `typeck`), and the registry
/// of monomorphized interface implementations.
pub struct AnalyzedModule {
    pub diagnostics: Diagnostics,
    pub types: typeck::TypeTable,
    pub call_targets: typeck::CallTargets,
    pub registry: TypeRegistry,
    pub impls: ImplRegistry,
    pub functions: Vec<Rc<FunctionSymbol>>,
}

/// Registers every named type declaration (struct/enum/interface/
/// bitstruct) into a [`TypeRegistry`] so forward references within the
/// same module resolve. Two-pass by construction: callers run this
/// before resolving any function signature or body.
fn register_named_types(module: &Module, registry: &mut TypeRegistry) {
    for decl in &module.decls {
        match decl {
            Decl::Struct(s) => {
                // Field types are resolved in a second pass once every
                // name is registered, so self-referential struct
                // pointers (`*Node` inside `struct Node`) work; here we
                // seed an empty definition that gets its fields filled
                // in below.
                registry.structs.insert(s.name.clone(), Rc::new(minz_types::StructDef { name: s.name.clone(), fields: vec![] }));
            }
            Decl::Enum(e) => {
                let mut next = 0i64;
                let variants = e
                    .variants
                    .iter()
                    .map(|v| {
                        let value = v.value.unwrap_or(next);
                        next = value + 1;
                        (v.name.clone(), value)
                    })
                    .collect();
                registry.enums.insert(e.name.clone(), Rc::new(minz_types::EnumDef { name: e.name.clone(), variants }));
            }
            Decl::BitStruct(b) => {
                let total: u8 = b.fields.iter().map(|f| f.width).sum();
                let fields = b.fields.iter().map(|f| (f.name.clone(), f.width)).collect();
                registry.bitstructs.insert(b.name.clone(), Rc::new(minz_types::BitStructDef { name: b.name.clone(), fields, total_bits: total }));
            }
            Decl::Interface(i) => {
                registry.interfaces.insert(i.name.clone(), Rc::new(minz_types::InterfaceDef { name: i.name.clone(), methods: vec![] }));
            }
            _ => {}
        }
    }
    // Second pass: fill in struct fields and interface method
    // signatures now that every named type resolves.
    for decl in &module.decls {
        if let Decl::Struct(s) = decl {
            let fields: Vec<(String, Type)> = s
                .fields
                .iter()
                .filter_map(|f| registry.resolve(&f.ty).ok().map(|t| (f.name.clone(), t)))
                .collect();
            registry.structs.insert(s.name.clone(), Rc::new(minz_types::StructDef { name: s.name.clone(), fields }));
        }
        if let Decl::Interface(i) = decl {
            let methods: Vec<(String, FunctionSig)> = i
                .methods
                .iter()
                .filter_map(|m| {
                    let params: Vec<Type> = m.params.iter().filter_map(|p| registry.resolve(&p.ty).ok()).collect();
                    let ret = registry.resolve(&m.ret).ok()?;
                    Some((m.name.clone(), FunctionSig { params, ret }))
                })
                .collect();
            registry.interfaces.insert(i.name.clone(), Rc::new(minz_types::InterfaceDef { name: i.name.clone(), methods }));
        }
    }
}

/// Declares every top-level function (including `impl` methods,
/// mangled per §4.6) into the root scope, forming overload sets where
/// names collide, and returns the flat list of function symbols in
/// declaration order for the MIR builder to iterate.
fn declare_functions(
    module: &Module,
    registry: &TypeRegistry,
    scopes: &mut ScopeManager,
    impls: &mut ImplRegistry,
    diags: &mut Diagnostics,
) -> Vec<Rc<FunctionSymbol>> {
    let mut out = Vec::new();
    for decl in &module.decls {
        match decl {
            Decl::Function(f) => {
                let params: Vec<Type> = f.params.iter().filter_map(|p| registry.resolve(&p.ty).ok()).collect();
                let ret = registry.resolve(&f.ret).unwrap_or(Type::Void);
                // Mangling finalizes once we know whether this name
                // forms an overload set; `define` below tells us by
                // returning whether the binding became one. We start
                // with the bare name and re-mangle after the fact.
                let sym = Rc::new(FunctionSymbol {
                    name: f.name.clone(),
                    params,
                    ret,
                    mangled_name: mangle::module_prefixed(&f.name),
                    is_pub: f.is_pub,
                    is_interrupt: f.is_interrupt,
                });
                if let Err(d) = scopes.define(&f.name, symbol::Symbol::Function(sym.clone()), f.pos) {
                    diags.push(d);
                }
                out.push(sym);
            }
            Decl::Impl(impl_decl) => {
                for method in &impl_decl.methods {
                    let params: Vec<Type> = method.params.iter().filter_map(|p| registry.resolve(&p.ty).ok()).collect();
                    let mangled = impls.register(&impl_decl.type_name, &impl_decl.interface_name, &method.name, &params);
                    let ret = registry.resolve(&method.ret).unwrap_or(Type::Void);
                    out.push(Rc::new(FunctionSymbol { name: method.name.clone(), params, ret, mangled_name: mangled, is_pub: false, is_interrupt: false }));
                }
            }
            _ => {}
        }
    }
    out
}

/// Run the full Semantic Transformer pipeline (minus metafunction
/// source-emission, which needs the out-of-scope parser injected by
/// the driver) over `module`, consuming it and handing back the
/// hoisted, typed result. `consts` is the active `TARGET`/`DEBUG`
/// compile-time constants (§6.4) that `@if`/`@elif`/`@else` chains
/// resolve against before anything else runs.
pub fn analyze(mut module: Module, consts: &CompileTimeConstants) -> (Module, AnalyzedModule) {
    let mut diags = Diagnostics::new();

    compileif::resolve_module(&mut module, consts, &mut diags);

    if let Err(d) = lambda::hoist_module(&mut module) {
        diags.push(d);
    }

    let mut registry = TypeRegistry::new();
    register_named_types(&module, &mut registry);

    let mut scopes = ScopeManager::new();
    let mut impls = ImplRegistry::new();
    let declared = declare_functions(&module, &registry, &mut scopes, &mut impls, &mut diags);

    // Re-mangle overloaded functions now that every sibling is known:
    // this finalizes `FunctionSymbol::mangled_name` for call sites
    // typechecked below (§4.1), and for the `functions` list the MIR
    // builder iterates to know what to emit.
    let functions = finalize_overload_mangling(declared, &scopes);

    let mut checker = TypeChecker::new(&registry);
    for f in module.functions() {
        scopes.enter_scope();
        for (i, p) in f.params.iter().enumerate() {
            if let Ok(ty) = registry.resolve(&p.ty) {
                let _ = scopes.define(
                    &p.name,
                    symbol::Symbol::Parameter(Rc::new(ParameterSymbol { name: p.name.clone(), ty, index: i })),
                    p.pos,
                );
            }
        }
        for stmt in &f.body.stmts {
            check_stmt(stmt, &mut checker, &mut scopes, &mut diags);
        }
        if let Some(tail) = &f.body.tail {
            if let Err(d) = checker.check_expr(tail, &scopes) {
                diags.push(d);
            }
        }
        scopes.leave_scope();
    }
    diags.extend(std::mem::take(&mut checker.diags));

    (module, AnalyzedModule { diagnostics: diags, types: checker.types, call_targets: checker.call_targets, registry, impls, functions })
}

fn check_stmt(stmt: &minz_ast::Stmt, checker: &mut TypeChecker, scopes: &mut ScopeManager, diags: &mut Diagnostics) {
    use minz_ast::StmtKind::*;
    match &stmt.kind {
        Let { name, mutable, ty, value } => {
            let value_ty = checker.check_expr(value, scopes);
            let resolved = match (ty, &value_ty) {
                (Some(t), _) => checker.registry.resolve(t),
                (None, Ok(t)) => Ok(t.clone()),
                (None, Err(_)) => Ok(Type::Void),
            };
            match (resolved, value_ty) {
                (Ok(declared), Ok(actual)) => {
                    if ty.is_some() && minz_types::assignable(&actual, &declared) == minz_types::Assignability::No {
                        diags.push(minz_diagnostics::Diagnostic::TypeMismatch { expected: declared.to_string(), actual: actual.to_string(), pos: value.pos });
                    }
                    let _ = scopes.define(name, symbol::Symbol::Variable(Rc::new(VariableSymbol { name: name.clone(), ty: declared, mutable: *mutable })), stmt.pos);
                }
                (Err(d), _) => diags.push(d),
                (_, Err(d)) => diags.push(d),
            }
        }
        Assign { target, value } => {
            if let Err(d) = checker.check_expr(value, scopes) {
                diags.push(d);
            }
            if let minz_ast::ExprKind::Identifier(name) = &target.kind {
                match scopes.lookup(name) {
                    Some(symbol::Symbol::Variable(v)) if !v.mutable => {
                        diags.push(minz_diagnostics::Diagnostic::ImmutableAssignment { name: name.clone(), pos: target.pos });
                    }
                    _ => {}
                }
            }
            if let Err(d) = checker.check_expr(target, scopes) {
                diags.push(d);
            }
        }
        CompoundAssign { target, value, .. } => {
            if let Err(d) = checker.check_expr(target, scopes) {
                diags.push(d);
            }
            if let Err(d) = checker.check_expr(value, scopes) {
                diags.push(d);
            }
        }
        ExprStmt(e) => {
            if let Err(d) = checker.check_expr(e, scopes) {
                diags.push(d);
            }
        }
        Return(e) => {
            if let Some(e) = e {
                if let Err(d) = checker.check_expr(e, scopes) {
                    diags.push(d);
                }
            }
        }
        ForRange { var, lo, hi, body } => {
            if let Err(d) = checker.check_expr(lo, scopes) {
                diags.push(d);
            }
            if let Err(d) = checker.check_expr(hi, scopes) {
                diags.push(d);
            }
            scopes.enter_scope();
            let _ = scopes.define(var, symbol::Symbol::Variable(Rc::new(VariableSymbol { name: var.clone(), ty: Type::U8, mutable: false })), stmt.pos);
            for s in body {
                check_stmt(s, checker, scopes, diags);
            }
            scopes.leave_scope();
        }
        While { cond, body } => {
            match checker.check_expr(cond, scopes) {
                Ok(t) if t != Type::Bool => diags.push(minz_diagnostics::Diagnostic::NonBooleanCondition { actual: t.to_string(), pos: cond.pos }),
                Err(d) => diags.push(d),
                _ => {}
            }
            scopes.enter_scope();
            for s in body {
                check_stmt(s, checker, scopes, diags);
            }
            scopes.leave_scope();
        }
        Loop { body } => {
            scopes.enter_scope();
            for s in body {
                check_stmt(s, checker, scopes, diags);
            }
            scopes.leave_scope();
        }
        Break | Continue => {}
    }
}

/// Overload-mangled names are assigned lazily: the first time two
/// functions of the same name are declared, `ScopeManager::define`
/// promotes the binding to an `OverloadSet`. This walks every such
/// set once, replaces each member with a fresh `Rc<FunctionSymbol>`
/// carrying its finalized `name$T1$T2$…` mangling (§4.1) — rewriting
/// the set in place so every later `scope.lookup` (and thus every
/// call site `typeck` resolves below) sees the final name — and
/// returns the flat, fully mangled function list for the MIR builder
/// to iterate.
fn finalize_overload_mangling(declared: Vec<Rc<FunctionSymbol>>, scopes: &ScopeManager) -> Vec<Rc<FunctionSymbol>> {
    let mut out = Vec::with_capacity(declared.len());
    let mut rewritten_sets = std::collections::HashSet::new();
    for f in declared {
        match scopes.lookup(&f.name) {
            Some(symbol::Symbol::OverloadSet(set)) => {
                if rewritten_sets.insert(f.name.clone()) {
                    let mut set_mut = set.borrow_mut();
                    for member in set_mut.members.iter_mut() {
                        let mangled = mangle::mangle_function(&member.name, &member.params, true);
                        *member = Rc::new(FunctionSymbol { mangled_name: mangled, ..(**member).clone() });
                    }
                }
                let refreshed = set.borrow().members.iter().find(|m| m.params == f.params).cloned();
                out.push(refreshed.unwrap_or(f));
            }
            _ => out.push(f),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ast::{FunctionBody, FunctionDecl, Param, TypeRef};

    fn test_consts() -> CompileTimeConstants {
        CompileTimeConstants::for_target("generic", false)
    }

    fn simple_function(name: &str, ret: &str) -> Decl {
        Decl::Function(FunctionDecl {
            name: name.to_string(),
            params: vec![],
            ret: TypeRef::Named(ret.into(), minz_diagnostics::Position::synthetic()),
            body: FunctionBody { stmts: vec![], tail: None },
            is_pub: false,
            is_interrupt: false,
            pos: minz_diagnostics::Position::synthetic(),
        })
    }

    #[test]
    fn analyze_empty_function_has_no_diagnostics() {
        let mut module = Module::new(None);
        module.decls.push(simple_function("main", "void"));
        let (_module, analyzed) = analyze(module, &test_consts());
        assert!(analyzed.diagnostics.is_empty());
        assert_eq!(analyzed.functions.len(), 1);
    }

    #[test]
    fn two_functions_same_name_form_overload_set() {
        let mut module = Module::new(None);
        module.decls.push(simple_function("f", "u8"));
        module.decls.push(simple_function("f", "u16"));
        let (_module, analyzed) = analyze(module, &test_consts());
        assert!(analyzed.diagnostics.is_empty());
        assert_eq!(analyzed.functions.len(), 2);
    }

    #[test]
    fn scenario_a_struct_registration_and_field_resolution() {
        let mut module = Module::new(None);
        module.decls.push(Decl::Struct(minz_ast::StructDecl {
            name: "Point".into(),
            fields: vec![minz_ast::FieldDecl { name: "x".into(), ty: TypeRef::Named("u8".into(), minz_diagnostics::Position::synthetic()), pos: minz_diagnostics::Position::synthetic() }],
            is_pub: false,
            pos: minz_diagnostics::Position::synthetic(),
        }));
        let (_module, analyzed) = analyze(module, &test_consts());
        let ty = analyzed.registry.structs.get("Point").unwrap();
        assert_eq!(ty.fields.len(), 1);
        assert_eq!(ty.fields[0].0, "x");
    }
}
