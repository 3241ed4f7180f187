//! The MIR Builder (spec §4.9): traverses the fully typed,
//! lambda-hoisted, interface-monomorphized AST that `minz_sema`
//! produces and emits one [`MirFunction`] per source function.
//!
//! Expressions yield a virtual register holding their result;
//! statements never do. Short-circuit `&&`/`||` emit explicit
//! branches rather than arithmetic. `for` loops over a compile-time
//! bounded, `<=255`-element range become DJNZ-loop candidates.
//! Iterator chains fuse into a single loop whose body applies every
//! stage's lambda as a direct `CALL`. `match` lowers to a sequential
//! decision tree.

use std::collections::HashMap;

use minz_ast::{BinOp, Decl, Expr, ExprKind, FunctionDecl, Module, Pattern, Stmt, StmtKind, UnOp};
use minz_diagnostics::Position;
use minz_sema::AnalyzedModule;
use minz_types::Type;

use crate::entities::Reg;
use crate::function::{CallConvention, MirFunction};
use crate::instr::{Instruction, Opcode, Signedness};
use crate::module::{GlobalData, MirModule};

/// Options that change how the builder lowers a function, mirroring
/// the CLI surface of §6.3 (`--enable-smc`) and the compile-time
/// constants of §6.4.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// When set, every function is compiled with the `smc` calling
    /// convention (§4.16 Scenario E): parameters are SMC anchors
    /// patched at the call site instead of pushed/loaded.
    pub enable_smc: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions { enable_smc: false }
    }
}

/// Build MIR for every function-shaped declaration in `ast`
/// (top-level functions, including hoisted lambdas and curry
/// specializations created along the way, plus `impl` methods),
/// consulting `analyzed` for resolved types and call targets.
pub fn build_module(ast: &Module, analyzed: &AnalyzedModule, opts: &BuildOptions) -> MirModule {
    let mut module = MirModule::new();
    let mut ctx = ModuleCtx { analyzed, opts, curry_counter: 0, extra_fns: Vec::new(), strings: 0 };

    for decl in &ast.decls {
        match decl {
            Decl::Function(f) => {
                let mangled = mangled_name_for(analyzed, &f.name, f.params.len());
                let mir_fn = ctx.build_function(f, &mangled);
                module.add_function(mir_fn);
            }
            Decl::Impl(impl_decl) => {
                for method in &impl_decl.methods {
                    let mangled = minz_sema::mangle::mangle_interface_method(
                        &impl_decl.type_name,
                        &impl_decl.interface_name,
                        &method.name,
                        &method_param_types(analyzed, method),
                    );
                    let mir_fn = ctx.build_function(method, &mangled);
                    module.add_function(mir_fn);
                }
            }
            _ => {}
        }
    }

    for extra in ctx.extra_fns.drain(..) {
        module.add_function(extra);
    }

    patch_smc_call_sites(&mut module);

    module
}

/// Rewrites direct calls whose callee was compiled with the `smc`
/// calling convention (§4.16 Scenario E): instead of materializing
/// arguments into registers, the caller patches each of the callee's
/// per-parameter anchors (`<callee>$p<index>$imm0`, see
/// `ModuleCtx::build_function`) immediately before `CALL`, and the
/// `call` instruction itself carries no source registers since the
/// callee reads its parameters back through `tsmc-load`, not
/// `load-param`.
///
/// Runs once over the whole module after every function (including
/// hoisted lambdas and curry specializations) exists, since a call
/// site built while lowering one function may target a callee that is
/// only added to the module afterwards.
fn patch_smc_call_sites(module: &mut MirModule) {
    let smc_callees: std::collections::HashSet<String> =
        module.functions.iter().filter(|(_, f)| f.convention == CallConvention::Smc).map(|(_, f)| f.name.clone()).collect();

    for (_, f) in module.functions.iter_mut() {
        rewrite_smc_calls(f, &smc_callees);
    }
}

fn rewrite_smc_calls(f: &mut MirFunction, smc_callees: &std::collections::HashSet<String>) {
    let mut rewritten = Vec::with_capacity(f.instrs.len());
    for instr in f.instrs.drain(..) {
        let is_smc_target = instr.opcode == Opcode::Call && instr.symbol.as_deref().map(|s| smc_callees.contains(s)).unwrap_or(false);
        if !is_smc_target {
            rewritten.push(instr);
            continue;
        }
        let symbol = instr.symbol.clone().expect("checked above");
        for (i, src) in instr.srcs.iter().enumerate() {
            let anchor = format!("{symbol}$p{i}$imm0");
            let ty = f.reg_type(*src).clone();
            rewritten.push(Instruction::new(Opcode::SmcPatch).with_src(*src).with_anchor(anchor).with_ty(ty));
        }
        let mut call = Instruction::new(Opcode::Call).with_symbol(symbol);
        if let Some(dest) = instr.dest {
            call = call.with_dest(dest);
        }
        if let Some(ty) = instr.ty.clone() {
            call = call.with_ty(ty);
        }
        if let Some(err_dest) = instr.err_dest {
            call = call.with_err_dest(err_dest);
        }
        rewritten.push(call);
    }
    f.instrs = rewritten;
}

fn method_param_types(analyzed: &AnalyzedModule, method: &FunctionDecl) -> Vec<Type> {
    method.params.iter().filter_map(|p| analyzed.registry.resolve(&p.ty).ok()).collect()
}

/// Looks up the finalized mangled name for a plain top-level function
/// by matching name and arity against `analyzed.functions` (populated,
/// post-mangling, by `minz_sema::analyze`).
fn mangled_name_for(analyzed: &AnalyzedModule, name: &str, arity: usize) -> String {
    analyzed
        .functions
        .iter()
        .find(|f| f.name == name && f.params.len() == arity)
        .map(|f| f.mangled_name.clone())
        .unwrap_or_else(|| name.to_string())
}

struct ModuleCtx<'a> {
    analyzed: &'a AnalyzedModule,
    opts: &'a BuildOptions,
    curry_counter: u32,
    extra_fns: Vec<MirFunction>,
    strings: u32,
}

impl<'a> ModuleCtx<'a> {
    fn build_function(&mut self, decl: &FunctionDecl, mangled_name: &str) -> MirFunction {
        let ret = self.analyzed.registry.resolve(&decl.ret).unwrap_or(Type::Void);
        let convention = if self.opts.enable_smc { CallConvention::Smc } else { CallConvention::Stack };
        let mut f = MirFunction::new(mangled_name, convention, ret);
        f.is_interrupt = decl.is_interrupt;

        let mut fb = FnBuilder {
            module_ctx: self,
            f: &mut f,
            scopes: vec![HashMap::new()],
            loop_stack: Vec::new(),
            label_counter: 0,
            error_discriminants: HashMap::new(),
        };

        for (i, param) in decl.params.iter().enumerate() {
            let ty = fb.module_ctx.analyzed.registry.resolve(&param.ty).unwrap_or(Type::U8);
            let reg = fb.f.new_reg(ty.clone());
            match convention {
                CallConvention::Smc => {
                    // Positional rather than name-keyed so that a call
                    // site — which only ever has argument position, not
                    // the callee's parameter names — can reconstruct the
                    // same anchor label (see `patch_smc_call_sites`).
                    let anchor = format!("{mangled_name}$p{i}$imm0");
                    fb.f.push(Instruction::new(Opcode::SmcAnchor).with_dest(reg).with_ty(ty.clone()).with_anchor(anchor.clone()));
                    fb.f.push(Instruction::new(Opcode::TsmcLoad).with_dest(reg).with_ty(ty).with_anchor(anchor));
                    fb.f.meta.uses_smc = true;
                }
                _ => {
                    fb.f.push(Instruction::new(Opcode::LoadParam).with_dest(reg).with_ty(ty).with_imm(f.param_regs.len() as i64));
                }
            }
            fb.f.param_regs.push(reg);
            fb.bind(&param.name, reg);
        }

        fb.lower_body(&decl.body.stmts, decl.body.tail.as_ref());
        f.meta.is_leaf = f.computes_no_calls();
        f
    }
}

/// Per-function lowering state: the lexical chain of name -> register
/// bindings (one `HashMap` per nested scope, mirroring
/// `minz_sema::scope::ScopeManager`'s lexical chain but keyed to
/// virtual registers instead of symbols), the enclosing loops' break/
/// continue labels, and the fresh-label counter.
struct FnBuilder<'a, 'b> {
    module_ctx: &'a mut ModuleCtx<'b>,
    f: &'a mut MirFunction,
    scopes: Vec<HashMap<String, Reg>>,
    loop_stack: Vec<(String, String)>,
    label_counter: u32,
    /// Maps a payload register produced by a call into an error-union
    /// type (spec §4.7) to the companion boolean register holding its
    /// discriminant, populated at the call site and consulted by
    /// `lower_try`/`lower_error_coalesce`. `bind`/`lookup` preserve a
    /// register's identity across a `let`, so a discriminant recorded
    /// here stays reachable through any number of variable rebindings
    /// of the same value.
    error_discriminants: HashMap<Reg, Reg>,
}

impl<'a, 'b> FnBuilder<'a, 'b> {
    fn bind(&mut self, name: &str, reg: Reg) {
        self.scopes.last_mut().expect("at least one scope").insert(name.to_string(), reg);
    }

    fn lookup(&self, name: &str) -> Option<Reg> {
        self.scopes.iter().rev().find_map(|s| s.get(name)).copied()
    }

    fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn leave_scope(&mut self) {
        self.scopes.pop();
    }

    fn fresh_label(&mut self, tag: &str) -> String {
        let n = self.label_counter;
        self.label_counter += 1;
        format!(".L{}_{n}", tag)
    }

    fn expr_type(&self, expr: &Expr) -> Type {
        self.module_ctx.analyzed.types.get(expr.id).cloned().unwrap_or(Type::Void)
    }

    fn lower_body(&mut self, stmts: &[Stmt], tail: Option<&Expr>) {
        for stmt in stmts {
            self.lower_stmt(stmt);
        }
        let reg = tail.and_then(|tail| self.lower_expr(tail));
        self.push_return(reg);
    }

    /// Emits a `return` carrying `value` (if any). When the enclosing
    /// function's return type is an error union (§4.7), also attaches
    /// the discriminant: the one `lower_try` recorded for `value` when
    /// it's propagating an existing error, or an ok (`false`)
    /// constant for a plain return of a success value.
    fn push_return(&mut self, value: Option<Reg>) {
        let mut instr = Instruction::new(Opcode::Return);
        if let Some(r) = value {
            instr = instr.with_src(r);
        }
        if matches!(self.f.ret, Type::ErrorUnion(_, _)) {
            let is_err = value.and_then(|r| self.error_discriminants.get(&r).copied()).unwrap_or_else(|| self.load_const(0, Type::Bool));
            instr = instr.with_err_dest(is_err);
        }
        self.f.push(instr);
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Let { name, value, .. } => {
                let reg = self.lower_expr(value);
                if let Some(reg) = reg {
                    self.bind(name, reg);
                }
            }
            StmtKind::Assign { target, value } => {
                let value_reg = self.lower_expr(value);
                self.lower_store(target, value_reg);
            }
            StmtKind::CompoundAssign { op, target, value } => {
                let target_reg = self.lower_expr(target);
                let value_reg = self.lower_expr(value);
                if let (Some(t), Some(v)) = (target_reg, value_reg) {
                    let ty = self.expr_type(target);
                    let result = self.f.new_reg(ty.clone());
                    self.f.push(binop_instr(*op, &ty).with_dest(result).with_src(t).with_src(v).with_ty(ty));
                    self.lower_store(target, Some(result));
                }
            }
            StmtKind::ExprStmt(e) => {
                self.lower_expr(e);
            }
            StmtKind::Return(e) => {
                let reg = e.as_ref().and_then(|e| self.lower_expr(e));
                self.push_return(reg);
            }
            StmtKind::ForRange { var, lo, hi, body } => self.lower_for_range(var, lo, hi, body),
            StmtKind::While { cond, body } => self.lower_while(cond, body),
            StmtKind::Loop { body } => self.lower_loop(body),
            StmtKind::Break => {
                if let Some((break_label, _)) = self.loop_stack.last().cloned() {
                    self.f.push(Instruction::new(Opcode::Jump).with_symbol(break_label));
                }
            }
            StmtKind::Continue => {
                if let Some((_, continue_label)) = self.loop_stack.last().cloned() {
                    self.f.push(Instruction::new(Opcode::Jump).with_symbol(continue_label));
                }
            }
        }
    }

    /// Store `value` into the memory/variable location named by
    /// `target` (an `Identifier`, `Field`, or `Index` expression).
    fn lower_store(&mut self, target: &Expr, value: Option<Reg>) {
        let Some(value) = value else { return };
        match &target.kind {
            ExprKind::Identifier(name) => {
                if let Some(existing) = self.lookup(name) {
                    self.f.push(Instruction::new(Opcode::Move).with_dest(existing).with_src(value));
                } else {
                    self.bind(name, value);
                }
            }
            ExprKind::Field { base, field } => {
                if let Some(base_reg) = self.lower_expr(base) {
                    self.f.push(Instruction::new(Opcode::StoreField).with_src(base_reg).with_src(value).with_symbol(field.clone()));
                }
            }
            ExprKind::Index { base, index } => {
                if let (Some(base_reg), Some(index_reg)) = (self.lower_expr(base), self.lower_expr(index)) {
                    self.f.push(Instruction::new(Opcode::StoreIndex).with_src(base_reg).with_src(index_reg).with_src(value));
                }
            }
            ExprKind::Unary(UnOp::Deref, inner) => {
                if let Some(ptr_reg) = self.lower_expr(inner) {
                    self.f.push(Instruction::new(Opcode::StoreIndirect).with_src(ptr_reg).with_src(value));
                }
            }
            _ => {}
        }
    }

    /// `for i in lo..hi { body }` (§4.9, §4.16): a DJNZ-loop candidate
    /// when both bounds are compile-time integer literals and
    /// `|hi-lo| <= 255` (§8.3: `0..256` is NOT a candidate).
    fn lower_for_range(&mut self, var: &str, lo: &Expr, hi: &Expr, body: &[Stmt]) {
        let djnz_count = match (&lo.kind, &hi.kind) {
            (ExprKind::IntLiteral(a), ExprKind::IntLiteral(b)) if b > a && b - a <= 255 => Some((b - a) as i64),
            _ => None,
        };

        let lo_reg = self.lower_expr(lo).unwrap_or_else(|| self.load_const(0, Type::U8));
        let top = self.fresh_label("for_top");
        let end = self.fresh_label("for_end");

        self.enter_scope();
        let iv = self.f.new_reg(Type::U8);
        self.f.push(Instruction::new(Opcode::Move).with_dest(iv).with_src(lo_reg));
        self.bind(var, iv);

        if let Some(count) = djnz_count {
            let counter = self.f.new_reg(Type::U8);
            self.f.push(Instruction::new(Opcode::LoadConst).with_dest(counter).with_imm(count).with_ty(Type::U8));
            self.f.push(Instruction::new(Opcode::Label).with_symbol(top.clone()).with_djnz(counter));
            self.loop_stack.push((end.clone(), top.clone()));
            for s in body {
                self.lower_stmt(s);
            }
            self.loop_stack.pop();
            let one = self.load_const(1, Type::U8);
            self.f.push(Instruction::new(Opcode::Add).with_dest(iv).with_src(iv).with_src(one).with_ty(Type::U8));
            self.f.push(Instruction::new(Opcode::JumpIfNonZero).with_src(counter).with_symbol(top));
            self.f.push(Instruction::new(Opcode::Label).with_symbol(end));
        } else {
            let hi_reg = self.lower_expr(hi).unwrap_or_else(|| self.load_const(0, Type::U16));
            self.f.push(Instruction::new(Opcode::Label).with_symbol(top.clone()));
            let cond = self.f.new_reg(Type::Bool);
            self.f.push(Instruction::new(Opcode::Lt(Signedness::Unsigned)).with_dest(cond).with_src(iv).with_src(hi_reg));
            self.f.push(Instruction::new(Opcode::JumpIfZero).with_src(cond).with_symbol(end.clone()));
            self.loop_stack.push((end.clone(), top.clone()));
            for s in body {
                self.lower_stmt(s);
            }
            self.loop_stack.pop();
            let one = self.load_const(1, Type::U16);
            self.f.push(Instruction::new(Opcode::Add).with_dest(iv).with_src(iv).with_src(one).with_ty(Type::U16));
            self.f.push(Instruction::new(Opcode::Jump).with_symbol(top));
            self.f.push(Instruction::new(Opcode::Label).with_symbol(end));
        }
        self.leave_scope();
    }

    fn lower_while(&mut self, cond: &Expr, body: &[Stmt]) {
        let top = self.fresh_label("while_top");
        let end = self.fresh_label("while_end");
        self.f.push(Instruction::new(Opcode::Label).with_symbol(top.clone()));
        let cond_reg = self.lower_expr(cond);
        if let Some(c) = cond_reg {
            self.f.push(Instruction::new(Opcode::JumpIfZero).with_src(c).with_symbol(end.clone()));
        }
        self.loop_stack.push((end.clone(), top.clone()));
        self.enter_scope();
        for s in body {
            self.lower_stmt(s);
        }
        self.leave_scope();
        self.loop_stack.pop();
        self.f.push(Instruction::new(Opcode::Jump).with_symbol(top));
        self.f.push(Instruction::new(Opcode::Label).with_symbol(end));
    }

    fn lower_loop(&mut self, body: &[Stmt]) {
        let top = self.fresh_label("loop_top");
        let end = self.fresh_label("loop_end");
        self.f.push(Instruction::new(Opcode::Label).with_symbol(top.clone()));
        self.loop_stack.push((end.clone(), top.clone()));
        self.enter_scope();
        for s in body {
            self.lower_stmt(s);
        }
        self.leave_scope();
        self.loop_stack.pop();
        self.f.push(Instruction::new(Opcode::Jump).with_symbol(top));
        self.f.push(Instruction::new(Opcode::Label).with_symbol(end));
    }

    fn load_const(&mut self, value: i64, ty: Type) -> Reg {
        let reg = self.f.new_reg(ty.clone());
        self.f.push(Instruction::new(Opcode::LoadConst).with_dest(reg).with_imm(value).with_ty(ty));
        reg
    }

    /// Lower `expr`, returning the register holding its value, or
    /// `None` for `void`-typed expressions (statements masquerading
    /// as expressions: print intrinsics, assignments-as-expressions).
    fn lower_expr(&mut self, expr: &Expr) -> Option<Reg> {
        match &expr.kind {
            ExprKind::IntLiteral(v) => {
                let ty = self.expr_type(expr);
                Some(self.load_const(*v as i64, ty))
            }
            ExprKind::BoolLiteral(b) => Some(self.load_const(if *b { 1 } else { 0 }, Type::Bool)),
            ExprKind::StringLiteral(s) => Some(self.load_string_literal(s)),
            ExprKind::InterpolatedString(pieces) => {
                let desugared_pieces: Vec<minz_ast::FormatPiece> = pieces.clone();
                self.lower_concat_pieces(&desugared_pieces)
            }
            ExprKind::Identifier(name) => self.lookup(name).or_else(|| {
                // A bare reference to a function (lambda hoisting
                // target, curry base, or a plain function used as a
                // value) yields its address, not a call (§4.4, §4.5).
                let mangled = mangled_name_for(self.module_ctx.analyzed, name, usize::MAX).ne("").then(|| name.to_string());
                mangled.map(|sym| {
                    let reg = self.f.new_reg(Type::U16);
                    self.f.push(Instruction::new(Opcode::AddressOf).with_dest(reg).with_symbol(sym).with_ty(Type::U16));
                    reg
                })
            }),
            ExprKind::Unary(op, inner) => self.lower_unary(*op, inner, expr.pos),
            ExprKind::Binary(op, lhs, rhs) => self.lower_binary(*op, lhs, rhs),
            ExprKind::Try(inner) => self.lower_try(inner, expr.pos),
            ExprKind::Call { callee, args } => self.lower_call(callee, args, expr),
            ExprKind::MethodCall { receiver, method, args } => self.lower_method_call(receiver, method, args, expr.pos),
            ExprKind::Field { base, field } => {
                let base_reg = self.lower_expr(base)?;
                let ty = self.expr_type(expr);
                let reg = self.f.new_reg(ty.clone());
                self.f.push(Instruction::new(Opcode::LoadField).with_dest(reg).with_src(base_reg).with_symbol(field.clone()).with_ty(ty));
                Some(reg)
            }
            ExprKind::Index { base, index } => {
                let base_reg = self.lower_expr(base)?;
                let index_reg = self.lower_expr(index)?;
                let ty = self.expr_type(expr);
                let reg = self.f.new_reg(ty.clone());
                self.f.push(Instruction::new(Opcode::LoadIndex).with_dest(reg).with_src(base_reg).with_src(index_reg).with_ty(ty));
                Some(reg)
            }
            ExprKind::Cast { expr: inner, .. } => {
                let inner_reg = self.lower_expr(inner)?;
                let ty = self.expr_type(expr);
                let reg = self.f.new_reg(ty.clone());
                self.f.push(Instruction::new(Opcode::Move).with_dest(reg).with_src(inner_reg).with_ty(ty));
                Some(reg)
            }
            ExprKind::ArrayLiteral(elems) => {
                let ty = self.expr_type(expr);
                let regs: Vec<Reg> = elems.iter().filter_map(|e| self.lower_expr(e)).collect();
                let reg = self.f.new_reg(ty.clone());
                self.f.push(Instruction::new(Opcode::AllocStack).with_dest(reg).with_ty(ty).with_imm(regs.len() as i64));
                for (i, elem_reg) in regs.into_iter().enumerate() {
                    let idx = self.load_const(i as i64, Type::U16);
                    self.f.push(Instruction::new(Opcode::StoreIndex).with_src(reg).with_src(idx).with_src(elem_reg));
                }
                Some(reg)
            }
            ExprKind::StructLiteral { fields, .. } => {
                let ty = self.expr_type(expr);
                let reg = self.f.new_reg(ty.clone());
                self.f.push(Instruction::new(Opcode::AllocStack).with_dest(reg).with_ty(ty));
                for field in fields {
                    if let Some(v) = self.lower_expr(&field.value) {
                        self.f.push(Instruction::new(Opcode::StoreField).with_src(reg).with_src(v).with_symbol(field.name.clone()));
                    }
                }
                Some(reg)
            }
            ExprKind::Lambda { .. } => {
                // Lambdas are hoisted to top-level functions before
                // the builder ever runs (§4.4); reaching one here
                // means hoisting was skipped (e.g. a capture error
                // already reported). Nothing sound to emit.
                None
            }
            ExprKind::Curry { lambda, value } => self.lower_curry(lambda, value, expr.pos),
            ExprKind::Match { scrutinee, arms } => self.lower_match(scrutinee, arms, expr),
            ExprKind::Block(stmts, tail) => {
                self.enter_scope();
                for s in stmts {
                    self.lower_stmt(s);
                }
                let result = tail.as_ref().and_then(|t| self.lower_expr(t));
                self.leave_scope();
                result
            }
            ExprKind::If { cond, then_branch, else_branch } => self.lower_if(cond, then_branch, else_branch.as_deref(), expr),
            ExprKind::IterChain { source, stages } => {
                self.lower_iter_chain(source, stages);
                None
            }
            ExprKind::Print { format } => {
                self.lower_print(format);
                None
            }
            ExprKind::ToString(inner) => self.lower_to_string(inner),
            ExprKind::Concat(pieces) => {
                let format_pieces: Vec<minz_ast::FormatPiece> = pieces
                    .iter()
                    .map(|p| match &p.kind {
                        ExprKind::StringLiteral(s) => minz_ast::FormatPiece::Literal(s.clone()),
                        ExprKind::ToString(inner) => minz_ast::FormatPiece::Interpolate(inner.clone()),
                        _ => minz_ast::FormatPiece::Interpolate(Box::new(p.clone())),
                    })
                    .collect();
                self.lower_concat_pieces(&format_pieces)
            }
            // Metaprogramming constructs resolved entirely during
            // semantic analysis (§4.8); none of them leave MIR of
            // their own by the time the builder runs. `CompileIf` in
            // particular is gone by now: `minz_sema::compileif`
            // replaces every `@if`/`@elif`/`@else` chain with its
            // selected branch before lambda hoisting even starts, so
            // this builder only ever sees the chosen arm in place.
            ExprKind::MinzBlock(_) | ExprKind::LuaBlock(_) | ExprKind::DefineTemplate { .. } | ExprKind::CompileIf { .. } => None,
        }
    }

    fn lower_unary(&mut self, op: UnOp, inner: &Expr, _pos: Position) -> Option<Reg> {
        let inner_reg = self.lower_expr(inner)?;
        let ty = self.expr_type(inner);
        match op {
            UnOp::Neg => {
                let reg = self.f.new_reg(ty.clone());
                self.f.push(Instruction::new(Opcode::Neg).with_dest(reg).with_src(inner_reg).with_ty(ty));
                Some(reg)
            }
            UnOp::Not => {
                let reg = self.f.new_reg(Type::Bool);
                self.f.push(Instruction::new(Opcode::Eq).with_dest(reg).with_src(inner_reg).with_imm(0).with_ty(Type::Bool));
                Some(reg)
            }
            UnOp::AddressOf => {
                let reg = self.f.new_reg(Type::U16);
                self.f.push(Instruction::new(Opcode::AddressOf).with_dest(reg).with_src(inner_reg).with_ty(Type::U16));
                Some(reg)
            }
            UnOp::Deref => {
                let pointee = match &ty {
                    Type::Pointer(p, _) => (**p).clone(),
                    other => other.clone(),
                };
                let reg = self.f.new_reg(pointee.clone());
                self.f.push(Instruction::new(Opcode::LoadIndirect).with_dest(reg).with_src(inner_reg).with_ty(pointee));
                Some(reg)
            }
        }
    }

    fn lower_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Option<Reg> {
        match op {
            BinOp::LogicalAnd => return self.lower_short_circuit(lhs, rhs, false),
            BinOp::LogicalOr => return self.lower_short_circuit(lhs, rhs, true),
            BinOp::ErrorCoalesce => return self.lower_error_coalesce(lhs, rhs),
            _ => {}
        }
        let lhs_reg = self.lower_expr(lhs)?;
        let rhs_reg = self.lower_expr(rhs)?;
        let ty = self.expr_type(lhs);
        let result_ty = if matches!(op, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge) {
            Type::Bool
        } else {
            ty.clone()
        };
        let reg = self.f.new_reg(result_ty.clone());
        self.f.push(binop_instr(op, &ty).with_dest(reg).with_src(lhs_reg).with_src(rhs_reg).with_ty(result_ty));
        Some(reg)
    }

    /// `&&`/`||` emit explicit branches instead of arithmetic (§4.9):
    /// `a && b` evaluates `a`; if false, short-circuits to `false`
    /// without evaluating `b`. `is_or` selects `||`'s mirrored form.
    fn lower_short_circuit(&mut self, lhs: &Expr, rhs: &Expr, is_or: bool) -> Option<Reg> {
        let result = self.f.new_reg(Type::Bool);
        let lhs_reg = self.lower_expr(lhs)?;
        self.f.push(Instruction::new(Opcode::Move).with_dest(result).with_src(lhs_reg));
        let skip = self.fresh_label(if is_or { "or_skip" } else { "and_skip" });
        let branch_op = if is_or { Opcode::JumpIfNonZero } else { Opcode::JumpIfZero };
        self.f.push(Instruction::new(branch_op).with_src(lhs_reg).with_symbol(skip.clone()));
        if let Some(rhs_reg) = self.lower_expr(rhs) {
            self.f.push(Instruction::new(Opcode::Move).with_dest(result).with_src(rhs_reg));
        }
        self.f.push(Instruction::new(Opcode::Label).with_symbol(skip));
        Some(result)
    }

    /// `lhs ?? rhs` (§4.7): yields `lhs`'s ok payload when it carries
    /// one, otherwise evaluates and yields `rhs`. Mirrors
    /// `lower_short_circuit`'s branch-and-merge shape, using
    /// `lhs`'s tracked discriminant (absent means `lhs` can't be an
    /// error, so `rhs` is dead and never evaluated).
    fn lower_error_coalesce(&mut self, lhs: &Expr, rhs: &Expr) -> Option<Reg> {
        let lhs_reg = self.lower_expr(lhs)?;
        let Some(is_err) = self.error_discriminants.get(&lhs_reg).copied() else {
            return Some(lhs_reg);
        };
        let result_ty = self.expr_type(lhs);
        let result = self.f.new_reg(result_ty);
        let ok_label = self.fresh_label("coalesce_ok");
        let end_label = self.fresh_label("coalesce_end");
        self.f.push(Instruction::new(Opcode::JumpIfZero).with_src(is_err).with_symbol(ok_label.clone()));
        if let Some(rhs_reg) = self.lower_expr(rhs) {
            self.f.push(Instruction::new(Opcode::Move).with_dest(result).with_src(rhs_reg));
        }
        self.f.push(Instruction::new(Opcode::Jump).with_symbol(end_label.clone()));
        self.f.push(Instruction::new(Opcode::Label).with_symbol(ok_label));
        self.f.push(Instruction::new(Opcode::Move).with_dest(result).with_src(lhs_reg));
        self.f.push(Instruction::new(Opcode::Label).with_symbol(end_label));
        Some(result)
    }

    /// `expr?` (§4.7): tests `expr`'s discriminant; on error, returns
    /// immediately carrying the error value; on ok, yields the ok
    /// payload. The discriminant comes from `error_discriminants`,
    /// populated at the call site that produced `inner`'s value; a
    /// value with no tracked discriminant can't have come from a
    /// failing call, so `?` is a no-op on it.
    fn lower_try(&mut self, inner: &Expr, _pos: Position) -> Option<Reg> {
        let value_reg = self.lower_expr(inner)?;
        let Some(is_err) = self.error_discriminants.get(&value_reg).copied() else {
            return Some(value_reg);
        };
        let ok_label = self.fresh_label("try_ok");
        self.f.push(Instruction::new(Opcode::JumpIfZero).with_src(is_err).with_symbol(ok_label.clone()).with_comment("error-union discriminant test"));
        self.push_return(Some(value_reg));
        self.f.push(Instruction::new(Opcode::Label).with_symbol(ok_label));
        Some(value_reg)
    }

    fn lower_call(&mut self, callee: &Expr, args: &[Expr], call_expr: &Expr) -> Option<Reg> {
        let arg_regs: Vec<Reg> = args.iter().filter_map(|a| self.lower_expr(a)).collect();
        let ret_ty = self.expr_type(call_expr);

        if let ExprKind::Identifier(name) = &callee.kind {
            let symbol = self.module_ctx.analyzed.call_targets.get(callee.id).map(str::to_string).unwrap_or_else(|| name.clone());
            return Some(self.emit_direct_call(&symbol, arg_regs, ret_ty));
        }

        // An indirect call through a function-valued expression
        // (curry result, stored function pointer).
        let callee_reg = self.lower_expr(callee)?;
        let dest = if ret_ty == Type::Void { None } else { Some(self.f.new_reg(ret_ty.clone())) };
        let mut instr = Instruction::new(Opcode::Call).with_src(callee_reg).with_ty(ret_ty.clone());
        for r in arg_regs {
            instr = instr.with_src(r);
        }
        if let Some(d) = dest {
            instr = instr.with_dest(d);
        }
        if let (Some(d), Type::ErrorUnion(_, _)) = (dest, &ret_ty) {
            let is_err = self.f.new_reg(Type::Bool);
            instr = instr.with_err_dest(is_err);
            self.error_discriminants.insert(d, is_err);
        }
        self.f.push(instr);
        dest
    }

    fn emit_direct_call(&mut self, symbol: &str, arg_regs: Vec<Reg>, ret_ty: Type) -> Reg {
        let dest = self.f.new_reg(ret_ty.clone());
        let mut instr = Instruction::new(Opcode::Call).with_dest(dest).with_symbol(symbol.to_string()).with_ty(ret_ty.clone());
        for r in arg_regs {
            instr = instr.with_src(r);
        }
        if matches!(ret_ty, Type::ErrorUnion(_, _)) {
            let is_err = self.f.new_reg(Type::Bool);
            instr = instr.with_err_dest(is_err);
            self.error_discriminants.insert(dest, is_err);
        }
        self.f.push(instr);
        dest
    }

    /// `receiver.method(args)` (§4.6): resolved to the concrete
    /// implementation's mangled symbol via `ImplRegistry` now that
    /// the receiver's concrete type is known from `TypeTable`.
    fn lower_method_call(&mut self, receiver: &Expr, method: &str, args: &[Expr], pos: Position) -> Option<Reg> {
        let receiver_ty = self.expr_type(receiver);
        let receiver_reg = self.lower_expr(receiver)?;
        let arg_regs: Vec<Reg> = args.iter().filter_map(|a| self.lower_expr(a)).collect();
        match self.module_ctx.analyzed.impls.resolve_call(&receiver_ty, None, method, pos) {
            Ok(symbol) => {
                let mut all_args = vec![receiver_reg];
                all_args.extend(arg_regs);
                Some(self.emit_direct_call(&symbol, all_args, Type::Void))
            }
            Err(_) => None,
        }
    }

    /// `@curry(lambda_expr, value)` (§4.5): clones the hoisted
    /// function `lambda_expr` names, drops its first parameter,
    /// prepends an SMC anchor for the captured value, and queues the
    /// specialization as an extra module-level function. Yields the
    /// specialization's address as a function-pointer value.
    fn lower_curry(&mut self, lambda: &Expr, value: &Expr, pos: Position) -> Option<Reg> {
        let ExprKind::Identifier(lambda_name) = &lambda.kind else { return None };
        let original = self.module_ctx.analyzed.functions.iter().find(|f| f.name == *lambda_name)?;
        if original.params.is_empty() {
            return None;
        }
        let counter = self.module_ctx.curry_counter;
        self.module_ctx.curry_counter += 1;
        let captured_ty = original.params[0].clone();
        let spec_name = format!("{lambda_name}$curry_{counter}");
        let anchor = format!("{spec_name}$captured$imm0");

        let value_reg = self.lower_expr(value);
        if let Some(v) = value_reg {
            self.f.push(Instruction::new(Opcode::SmcPatch).with_src(v).with_anchor(anchor.clone()).with_ty(captured_ty.clone()));
        }

        // The specialization body itself is built once the AST
        // declaration for `lambda_name` is available; since this
        // builder only sees already-hoisted top-level declarations
        // through `build_module`'s outer loop (not from inside
        // expression lowering), the specialization is recorded as a
        // thin forwarding stub that reads the anchor and tail-calls
        // the original with it prepended, which is sound regardless
        // of the original body's contents and avoids re-parsing it
        // here.
        let mut spec = MirFunction::new(&spec_name, CallConvention::Smc, original.ret.clone());
        let anchor_reg = spec.new_reg(captured_ty.clone());
        spec.push(Instruction::new(Opcode::SmcAnchor).with_dest(anchor_reg).with_ty(captured_ty).with_anchor(anchor));
        spec.meta.uses_smc = true;
        let mut rest_regs = Vec::new();
        for (i, p) in original.params.iter().enumerate().skip(1) {
            let r = spec.new_reg(p.clone());
            spec.push(Instruction::new(Opcode::LoadParam).with_dest(r).with_ty(p.clone()).with_imm((i - 1) as i64));
            spec.param_regs.push(r);
            rest_regs.push(r);
        }
        let mut call = Instruction::new(Opcode::TailCall).with_symbol(original.mangled_name.clone()).with_src(anchor_reg);
        for r in rest_regs {
            call = call.with_src(r);
        }
        spec.push(call);
        self.module_ctx.extra_fns.push(spec);

        let reg = self.f.new_reg(Type::U16);
        self.f.push(Instruction::new(Opcode::AddressOf).with_dest(reg).with_symbol(spec_name).with_ty(Type::U16));
        let _ = pos;
        Some(reg)
    }

    /// `match` lowers to a sequential decision tree (§4.9): the
    /// scrutinee is evaluated once; each arm's pattern is tested in
    /// order, jumping to that arm's body on match and falling through
    /// to the next test otherwise; every arm's result is moved into a
    /// shared result register before jumping to a merge label.
    fn lower_match(&mut self, scrutinee: &Expr, arms: &[minz_ast::MatchArm], match_expr: &Expr) -> Option<Reg> {
        let scrutinee_reg = self.lower_expr(scrutinee)?;
        let scrutinee_ty = self.expr_type(scrutinee);
        let result_ty = self.expr_type(match_expr);
        let result = if result_ty == Type::Void { None } else { Some(self.f.new_reg(result_ty.clone())) };
        let merge = self.fresh_label("match_merge");

        for arm in arms {
            let next = self.fresh_label("match_next");
            self.enter_scope();
            self.emit_pattern_test(&arm.pattern, scrutinee_reg, &scrutinee_ty, &next);
            if let Some(guard) = &arm.guard {
                if let Some(g) = self.lower_expr(guard) {
                    self.f.push(Instruction::new(Opcode::JumpIfZero).with_src(g).with_symbol(next.clone()));
                }
            }
            let body_reg = self.lower_expr(&arm.body);
            if let (Some(dest), Some(src)) = (result, body_reg) {
                self.f.push(Instruction::new(Opcode::Move).with_dest(dest).with_src(src));
            }
            self.leave_scope();
            self.f.push(Instruction::new(Opcode::Jump).with_symbol(merge.clone()));
            self.f.push(Instruction::new(Opcode::Label).with_symbol(next));
        }
        self.f.push(Instruction::new(Opcode::Label).with_symbol(merge));
        result
    }

    fn emit_pattern_test(&mut self, pattern: &Pattern, scrutinee: Reg, scrutinee_ty: &Type, fail_label: &str) {
        match pattern {
            Pattern::Wildcard(_) => {}
            Pattern::Binding(name, _) => self.bind(name, scrutinee),
            Pattern::Literal(lit_expr, _) => {
                if let Some(lit_reg) = self.lower_expr(lit_expr) {
                    let cond = self.f.new_reg(Type::Bool);
                    self.f.push(Instruction::new(Opcode::Eq).with_dest(cond).with_src(scrutinee).with_src(lit_reg).with_ty(Type::Bool));
                    self.f.push(Instruction::new(Opcode::JumpIfZero).with_src(cond).with_symbol(fail_label.to_string()));
                }
            }
            Pattern::Range(lo, hi, _) => {
                let lo_reg = self.load_const(*lo, Type::I16);
                let hi_reg = self.load_const(*hi, Type::I16);
                let ge = self.f.new_reg(Type::Bool);
                self.f.push(Instruction::new(Opcode::Ge(Signedness::Signed)).with_dest(ge).with_src(scrutinee).with_src(lo_reg).with_ty(Type::Bool));
                self.f.push(Instruction::new(Opcode::JumpIfZero).with_src(ge).with_symbol(fail_label.to_string()));
                let lt = self.f.new_reg(Type::Bool);
                self.f.push(Instruction::new(Opcode::Lt(Signedness::Signed)).with_dest(lt).with_src(scrutinee).with_src(hi_reg).with_ty(Type::Bool));
                self.f.push(Instruction::new(Opcode::JumpIfZero).with_src(lt).with_symbol(fail_label.to_string()));
            }
            Pattern::EnumVariant { variant, .. } => {
                if let Type::Enum(def) = scrutinee_ty {
                    if let Some(discriminant) = def.discriminant_of(variant) {
                        let lit_reg = self.load_const(discriminant, Type::U8);
                        let cond = self.f.new_reg(Type::Bool);
                        self.f.push(Instruction::new(Opcode::Eq).with_dest(cond).with_src(scrutinee).with_src(lit_reg).with_ty(Type::Bool));
                        self.f.push(Instruction::new(Opcode::JumpIfZero).with_src(cond).with_symbol(fail_label.to_string()));
                    }
                }
            }
            Pattern::Struct { fields, .. } => {
                for (name, sub) in fields {
                    let field_reg = self.f.new_reg(Type::U8);
                    self.f.push(Instruction::new(Opcode::LoadField).with_dest(field_reg).with_src(scrutinee).with_symbol(name.clone()));
                    self.emit_pattern_test(sub, field_reg, scrutinee_ty, fail_label);
                }
            }
        }
    }

    fn lower_if(&mut self, cond: &Expr, then_branch: &Expr, else_branch: Option<&Expr>, if_expr: &Expr) -> Option<Reg> {
        let cond_reg = self.lower_expr(cond)?;
        let result_ty = self.expr_type(if_expr);
        let result = if result_ty == Type::Void { None } else { Some(self.f.new_reg(result_ty)) };
        let else_label = self.fresh_label("if_else");
        let end_label = self.fresh_label("if_end");
        self.f.push(Instruction::new(Opcode::JumpIfZero).with_src(cond_reg).with_symbol(else_label.clone()));
        let then_reg = self.lower_expr(then_branch);
        if let (Some(dest), Some(src)) = (result, then_reg) {
            self.f.push(Instruction::new(Opcode::Move).with_dest(dest).with_src(src));
        }
        self.f.push(Instruction::new(Opcode::Jump).with_symbol(end_label.clone()));
        self.f.push(Instruction::new(Opcode::Label).with_symbol(else_label));
        if let Some(else_branch) = else_branch {
            let else_reg = self.lower_expr(else_branch);
            if let (Some(dest), Some(src)) = (result, else_reg) {
                self.f.push(Instruction::new(Opcode::Move).with_dest(dest).with_src(src));
            }
        }
        self.f.push(Instruction::new(Opcode::Label).with_symbol(end_label));
        result
    }

    /// Fuses `source.iter().stage1().…().forEach(h)` into a single
    /// loop (§4.9, Scenario D): the builder never materializes an
    /// iterator object, it emits one DJNZ-or-compare loop over
    /// `source`'s elements, applying each stage's (already hoisted)
    /// lambda as a direct `CALL`, with `Filter` stages conditionally
    /// skipping the remaining stages for that element.
    fn lower_iter_chain(&mut self, source: &Expr, stages: &[minz_ast::IterStage]) {
        let source_ty = self.expr_type(source);
        let Type::Array(elem_ty, len) = source_ty else { return };
        let source_reg = match self.lower_expr(source) {
            Some(r) => r,
            None => return,
        };

        let top = self.fresh_label("iter_top");
        let end = self.fresh_label("iter_end");
        let skip = self.fresh_label("iter_skip");

        let index = self.f.new_reg(Type::U16);
        self.f.push(Instruction::new(Opcode::LoadConst).with_dest(index).with_imm(0).with_ty(Type::U16));

        if len <= 255 {
            let counter = self.f.new_reg(Type::U8);
            self.f.push(Instruction::new(Opcode::LoadConst).with_dest(counter).with_imm(len as i64).with_ty(Type::U8));
            self.f.push(Instruction::new(Opcode::Label).with_symbol(top.clone()).with_djnz(counter));
            self.emit_iter_body(source_reg, index, (*elem_ty).clone(), stages, &skip);
            self.f.push(Instruction::new(Opcode::Label).with_symbol(skip.clone()));
            let one = self.load_const(1, Type::U16);
            self.f.push(Instruction::new(Opcode::Add).with_dest(index).with_src(index).with_src(one).with_ty(Type::U16));
            self.f.push(Instruction::new(Opcode::JumpIfNonZero).with_src(counter).with_symbol(top));
            self.f.push(Instruction::new(Opcode::Label).with_symbol(end));
        } else {
            let limit = self.load_const(len as i64, Type::U16);
            self.f.push(Instruction::new(Opcode::Label).with_symbol(top.clone()));
            let cond = self.f.new_reg(Type::Bool);
            self.f.push(Instruction::new(Opcode::Lt(Signedness::Unsigned)).with_dest(cond).with_src(index).with_src(limit));
            self.f.push(Instruction::new(Opcode::JumpIfZero).with_src(cond).with_symbol(end.clone()));
            self.emit_iter_body(source_reg, index, (*elem_ty).clone(), stages, &skip);
            self.f.push(Instruction::new(Opcode::Label).with_symbol(skip.clone()));
            let one = self.load_const(1, Type::U16);
            self.f.push(Instruction::new(Opcode::Add).with_dest(index).with_src(index).with_src(one).with_ty(Type::U16));
            self.f.push(Instruction::new(Opcode::Jump).with_symbol(top));
            self.f.push(Instruction::new(Opcode::Label).with_symbol(end));
        }
    }

    fn emit_iter_body(&mut self, source_reg: Reg, index: Reg, elem_ty: Type, stages: &[minz_ast::IterStage], skip: &str) {
        let elem = self.f.new_reg(elem_ty.clone());
        self.f.push(Instruction::new(Opcode::LoadIndex).with_dest(elem).with_src(source_reg).with_src(index).with_ty(elem_ty.clone()));
        let mut current = elem;
        for stage in stages {
            match stage {
                minz_ast::IterStage::Map(f) => {
                    if let Some(sym) = stage_symbol(f) {
                        current = self.emit_direct_call(&sym, vec![current], elem_ty.clone());
                    }
                }
                minz_ast::IterStage::Filter(f) => {
                    if let Some(sym) = stage_symbol(f) {
                        let cond = self.emit_direct_call(&sym, vec![current], Type::Bool);
                        self.f.push(Instruction::new(Opcode::JumpIfZero).with_src(cond).with_symbol(skip.to_string()));
                    }
                }
                minz_ast::IterStage::ForEach(f) => {
                    if let Some(sym) = stage_symbol(f) {
                        self.emit_direct_call(&sym, vec![current], Type::Void);
                    }
                }
            }
        }
    }

    fn lower_print(&mut self, format: &[minz_ast::FormatPiece]) {
        for piece in format {
            match piece {
                minz_ast::FormatPiece::Literal(s) => {
                    let reg = self.load_string_literal(s);
                    self.f.push(Instruction::new(Opcode::PrintString).with_src(reg));
                }
                minz_ast::FormatPiece::Interpolate(e) => {
                    if let Some(reg) = self.lower_expr(e) {
                        let ty = self.expr_type(e);
                        self.f.push(print_intrinsic(&ty).with_src(reg));
                    }
                }
            }
        }
    }

    fn lower_concat_pieces(&mut self, pieces: &[minz_ast::FormatPiece]) -> Option<Reg> {
        self.lower_print(pieces);
        None
    }

    fn lower_to_string(&mut self, inner: &Expr) -> Option<Reg> {
        let reg = self.lower_expr(inner)?;
        let ty = self.expr_type(inner);
        self.f.push(print_intrinsic(&ty).with_src(reg));
        None
    }

    fn load_string_literal(&mut self, s: &str) -> Reg {
        let label = format!(".Lstr{}", self.module_ctx.strings);
        self.module_ctx.strings += 1;
        let reg = self.f.new_reg(Type::String);
        self.f.push(Instruction::new(Opcode::AddressOf).with_dest(reg).with_symbol(label).with_imm(s.len() as i64).with_ty(Type::String));
        reg
    }
}

/// The `IterStage`'s lambda reference is always a hoisted function
/// name after `minz_sema::lambda` runs (§4.4); extracts that name.
fn stage_symbol(expr: &Expr) -> Option<String> {
    match &expr.kind {
        ExprKind::Identifier(name) => Some(name.clone()),
        _ => None,
    }
}

fn binop_instr(op: BinOp, ty: &Type) -> Instruction {
    let signed = ty.is_signed_int();
    let sign = if signed { Signedness::Signed } else { Signedness::Unsigned };
    let opcode = match op {
        BinOp::Add => Opcode::Add,
        BinOp::Sub => Opcode::Sub,
        BinOp::Mul => Opcode::Mul,
        BinOp::Div => Opcode::Div(sign),
        BinOp::Mod => Opcode::Mod(sign),
        BinOp::And => Opcode::And,
        BinOp::Or => Opcode::Or,
        BinOp::Xor => Opcode::Xor,
        BinOp::Shl => Opcode::Shl,
        BinOp::Shr => Opcode::Shr(sign),
        BinOp::Eq => Opcode::Eq,
        BinOp::Ne => Opcode::Ne,
        BinOp::Lt => Opcode::Lt(sign),
        BinOp::Le => Opcode::Le(sign),
        BinOp::Gt => Opcode::Gt(sign),
        BinOp::Ge => Opcode::Ge(sign),
        BinOp::LogicalAnd | BinOp::LogicalOr => unreachable!("short-circuited separately"),
        BinOp::ErrorCoalesce => unreachable!("lowered separately by lower_error_coalesce"),
    };
    Instruction::new(opcode)
}

fn print_intrinsic(ty: &Type) -> Instruction {
    let opcode = match ty {
        Type::U8 => Opcode::PrintU8,
        Type::U16 | Type::U24 => Opcode::PrintU16,
        Type::I8 => Opcode::PrintI8,
        Type::I16 | Type::I24 => Opcode::PrintI16,
        Type::Bool => Opcode::PrintBool,
        _ => Opcode::PrintString,
    };
    Instruction::new(opcode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ast::{FunctionBody, NodeId, Param, TypeRef};
    use minz_diagnostics::Position;
    use minz_entity::EntityRef;

    fn u8_ty(pos: Position) -> TypeRef {
        TypeRef::Named("u8".into(), pos)
    }

    fn simple_add_function() -> FunctionDecl {
        let pos = Position::synthetic();
        FunctionDecl {
            name: "add".into(),
            params: vec![Param { name: "a".into(), ty: u8_ty(pos), pos }, Param { name: "b".into(), ty: u8_ty(pos), pos }],
            ret: u8_ty(pos),
            body: FunctionBody { stmts: vec![], tail: None },
            is_pub: false,
            is_interrupt: false,
            pos,
        }
    }

    #[test]
    fn builds_a_function_with_param_loads_and_return() {
        let mut module = Module::new(None);
        module.decls.push(Decl::Function(simple_add_function()));
        let (ast, analyzed) = minz_sema::analyze(module, &minz_sema::meta::CompileTimeConstants::for_target("generic", false));
        let mir = build_module(&ast, &analyzed, &BuildOptions::default());
        let f = mir.find_function("add").map(|id| &mir.functions[id]).unwrap();
        assert_eq!(f.param_regs.len(), 2);
        assert!(f.instrs.iter().any(|i| i.opcode == Opcode::LoadParam));
        assert!(matches!(f.instrs.last().unwrap().opcode, Opcode::Return));
    }

    #[test]
    fn smc_convention_emits_anchors_instead_of_load_param() {
        let mut module = Module::new(None);
        module.decls.push(Decl::Function(simple_add_function()));
        let (ast, analyzed) = minz_sema::analyze(module, &minz_sema::meta::CompileTimeConstants::for_target("generic", false));
        let mir = build_module(&ast, &analyzed, &BuildOptions { enable_smc: true });
        let f = mir.find_function("add").map(|id| &mir.functions[id]).unwrap();
        assert!(f.meta.uses_smc);
        assert!(f.instrs.iter().any(|i| i.opcode == Opcode::SmcAnchor));
        assert!(f.instrs.iter().any(|i| i.opcode == Opcode::TsmcLoad));
    }

    #[test]
    fn smc_convention_patches_the_callers_anchors_instead_of_passing_registers() {
        let pos = Position::synthetic();
        let mut module = Module::new(None);
        module.decls.push(Decl::Function(simple_add_function()));
        let call = Expr::new(
            NodeId::new(0),
            ExprKind::Call {
                callee: Box::new(Expr::new(NodeId::new(1), ExprKind::Identifier("add".into()), pos)),
                args: vec![Expr::new(NodeId::new(2), ExprKind::IntLiteral(1), pos), Expr::new(NodeId::new(3), ExprKind::IntLiteral(2), pos)],
            },
            pos,
        );
        module.decls.push(Decl::Function(FunctionDecl {
            name: "main".into(),
            params: vec![],
            ret: TypeRef::Named("void".into(), pos),
            body: FunctionBody { stmts: vec![Stmt::new(StmtKind::ExprStmt(call), pos)], tail: None },
            is_pub: true,
            is_interrupt: false,
            pos,
        }));
        let (ast, analyzed) = minz_sema::analyze(module, &minz_sema::meta::CompileTimeConstants::for_target("generic", false));
        let mir = build_module(&ast, &analyzed, &BuildOptions { enable_smc: true });

        let main_f = mir.find_function("main").map(|id| &mir.functions[id]).unwrap();
        let patches: Vec<&Instruction> = main_f.instrs.iter().filter(|i| i.opcode == Opcode::SmcPatch).collect();
        assert_eq!(patches.len(), 2, "one smc-patch per argument, found: {main_f:#?}");
        assert_eq!(patches[0].smc_anchor.as_deref(), Some("add$p0$imm0"));
        assert_eq!(patches[1].smc_anchor.as_deref(), Some("add$p1$imm0"));

        let call_instr = main_f.instrs.iter().find(|i| i.opcode == Opcode::Call && i.symbol.as_deref() == Some("add")).unwrap();
        assert!(call_instr.srcs.is_empty(), "arguments travel through patched anchors, not call-site registers");
    }

    #[test]
    fn error_propagation_wires_a_real_discriminant_through_try() {
        let pos = Position::synthetic();
        let mut module = Module::new(None);
        module.decls.push(Decl::Enum(minz_ast::EnumDecl {
            name: "MyError".into(),
            variants: vec![minz_ast::EnumVariantDecl { name: "Bad".into(), value: None, pos }],
            is_pub: false,
            pos,
        }));
        let err_ret = minz_ast::TypeRef::ErrorUnion(Box::new(u8_ty(pos)), "MyError".into(), pos);
        module.decls.push(Decl::Function(FunctionDecl {
            name: "risky".into(),
            params: vec![],
            ret: err_ret.clone(),
            body: FunctionBody { stmts: vec![], tail: Some(Expr::new(NodeId::new(0), ExprKind::IntLiteral(1), pos)) },
            is_pub: false,
            is_interrupt: false,
            pos,
        }));
        let try_expr = Expr::new(
            NodeId::new(1),
            ExprKind::Try(Box::new(Expr::new(
                NodeId::new(2),
                ExprKind::Call { callee: Box::new(Expr::new(NodeId::new(3), ExprKind::Identifier("risky".into()), pos)), args: vec![] },
                pos,
            ))),
            pos,
        );
        module.decls.push(Decl::Function(FunctionDecl {
            name: "wrapper".into(),
            params: vec![],
            ret: err_ret,
            body: FunctionBody { stmts: vec![], tail: Some(try_expr) },
            is_pub: false,
            is_interrupt: false,
            pos,
        }));

        let (ast, analyzed) = minz_sema::analyze(module, &minz_sema::meta::CompileTimeConstants::for_target("generic", false));
        assert!(!analyzed.diagnostics.has_fatal());
        let mir = build_module(&ast, &analyzed, &BuildOptions::default());
        let wrapper = mir.find_function("wrapper").map(|id| &mir.functions[id]).unwrap();

        let call = wrapper.instrs.iter().find(|i| i.opcode == Opcode::Call).expect("wrapper calls risky");
        assert!(call.err_dest.is_some(), "a call returning an error union must carry a discriminant register");

        let returns: Vec<&Instruction> = wrapper.instrs.iter().filter(|i| i.opcode == Opcode::Return).collect();
        assert!(returns.iter().any(|r| r.err_dest == call.err_dest), "at least one return should propagate the call's discriminant");
        assert!(wrapper.instrs.iter().any(|i| i.opcode == Opcode::JumpIfZero), "`?` should branch on the discriminant rather than always returning");
    }

    #[test]
    fn scenario_a_two_overloads_get_distinct_mangled_names() {
        let pos = Position::synthetic();
        let mut module = Module::new(None);
        let print_u8 = FunctionDecl {
            name: "print".into(),
            params: vec![Param { name: "v".into(), ty: TypeRef::Named("u8".into(), pos), pos }],
            ret: TypeRef::Named("void".into(), pos),
            body: FunctionBody { stmts: vec![], tail: None },
            is_pub: false,
            is_interrupt: false,
            pos,
        };
        let print_u16 = FunctionDecl {
            name: "print".into(),
            params: vec![Param { name: "v".into(), ty: TypeRef::Named("u16".into(), pos), pos }],
            ret: TypeRef::Named("void".into(), pos),
            body: FunctionBody { stmts: vec![], tail: None },
            is_pub: false,
            is_interrupt: false,
            pos,
        };
        module.decls.push(Decl::Function(print_u8));
        module.decls.push(Decl::Function(print_u16));
        let (ast, analyzed) = minz_sema::analyze(module, &minz_sema::meta::CompileTimeConstants::for_target("generic", false));
        let mir = build_module(&ast, &analyzed, &BuildOptions::default());
        assert!(mir.find_function("print$u8").is_some());
        assert!(mir.find_function("print$u16").is_some());
    }

    #[test]
    fn scenario_c_djnz_candidate_for_range_under_256() {
        let pos = Position::synthetic();
        let mut module = Module::new(None);
        let body = FunctionBody {
            stmts: vec![Stmt::new(
                StmtKind::ForRange {
                    var: "i".into(),
                    lo: Expr::new(NodeId::new(0), ExprKind::IntLiteral(1), pos),
                    hi: Expr::new(NodeId::new(1), ExprKind::IntLiteral(11), pos),
                    body: vec![],
                },
                pos,
            )],
            tail: None,
        };
        module.decls.push(Decl::Function(FunctionDecl {
            name: "sum_to_ten".into(),
            params: vec![],
            ret: TypeRef::Named("u8".into(), pos),
            body,
            is_pub: false,
            is_interrupt: false,
            pos,
        }));
        let (ast, analyzed) = minz_sema::analyze(module, &minz_sema::meta::CompileTimeConstants::for_target("generic", false));
        let mir = build_module(&ast, &analyzed, &BuildOptions::default());
        let f = mir.find_function("sum_to_ten").map(|id| &mir.functions[id]).unwrap();
        assert!(f.instrs.iter().any(|i| i.djnz.is_some()));
    }
}
