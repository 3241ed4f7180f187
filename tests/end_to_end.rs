//! Whole-pipeline integration tests built directly from the
//! concrete scenarios in spec.md §8.4, constructing the AST by hand
//! since the parser is out of scope for this workspace (§1, §6.1)
//! and asserting on the emitted MIR/assembly `minzc::compile` produces.

use minz_ast::{
    BinOp, Decl, Expr, ExprKind, FunctionBody, FunctionDecl, Module, NodeId, Param, Stmt, StmtKind, TypeRef,
};
use minz_diagnostics::Position;
use minz_entity::EntityRef;
use minz_mir::instr::Opcode;
use minzc::{CompileOptions, Target, TargetConfig};

fn pos() -> Position {
    Position::synthetic()
}

fn ty(name: &str) -> TypeRef {
    TypeRef::Named(name.to_string(), pos())
}

fn ident(id: u32, name: &str) -> Expr {
    Expr::new(NodeId::new(id as usize), ExprKind::Identifier(name.to_string()), pos())
}

fn int_lit(id: u32, value: u64) -> Expr {
    Expr::new(NodeId::new(id as usize), ExprKind::IntLiteral(value), pos())
}

/// Scenario B (§8.4): `fun add(a: u8, b: u8) -> u8 { a + b }` called
/// as `add(5, 3)` from `main`. With CTIE enabled the call disappears
/// from the MIR entirely, replaced by a folded constant.
#[test]
fn scenario_b_ctie_folds_a_pure_call_into_a_constant() {
    let mut module = Module::new(None);

    let add = FunctionDecl {
        name: "add".into(),
        params: vec![Param { name: "a".into(), ty: ty("u8"), pos: pos() }, Param { name: "b".into(), ty: ty("u8"), pos: pos() }],
        ret: ty("u8"),
        body: FunctionBody {
            stmts: vec![],
            tail: Some(Expr::new(NodeId::new(10), ExprKind::Binary(BinOp::Add, Box::new(ident(0, "a")), Box::new(ident(1, "b"))), pos())),
        },
        is_pub: false,
        is_interrupt: false,
        pos: pos(),
    };

    let call = Expr::new(
        NodeId::new(11),
        ExprKind::Call { callee: Box::new(ident(2, "add")), args: vec![int_lit(3, 5), int_lit(4, 3)] },
        pos(),
    );
    let main = FunctionDecl {
        name: "main".into(),
        params: vec![],
        ret: ty("u8"),
        body: FunctionBody { stmts: vec![], tail: Some(call) },
        is_pub: true,
        is_interrupt: false,
        pos: pos(),
    };

    module.decls.push(Decl::Function(add));
    module.decls.push(Decl::Function(main));

    let opts = CompileOptions { enable_ctie: true, ..Default::default() };
    let out = minzc::compile(module, &opts).expect("compiles");
    assert!(!out.diagnostics.has_fatal());

    let mir = out.mir.expect("mir should have been built");
    let main_id = mir.find_function("main").expect("main survives DCE");
    let main_fn = &mir.functions[main_id];

    assert!(
        !main_fn.instrs.iter().any(|i| i.opcode == Opcode::Call),
        "CTIE should have removed the call to add, found: {:#?}",
        main_fn.instrs
    );
    assert!(
        main_fn.instrs.iter().any(|i| i.opcode == Opcode::ConstResult && i.imm == Some(8)),
        "expected a folded constant 8 in main's MIR, found: {:#?}",
        main_fn.instrs
    );

    // `add` itself becomes unreferenced once the call is folded away
    // and is swept by the module-wide DCE pass (§4.12).
    assert!(mir.find_function("add").is_none());
}

/// Scenario B, disabled: with CTIE off the call must survive verbatim
/// and the callee must still be emitted (§8.4 Scenario B, "With CTIE
/// disabled").
#[test]
fn scenario_b_without_ctie_the_call_and_callee_both_survive() {
    let mut module = Module::new(None);

    let add = FunctionDecl {
        name: "add".into(),
        params: vec![Param { name: "a".into(), ty: ty("u8"), pos: pos() }, Param { name: "b".into(), ty: ty("u8"), pos: pos() }],
        ret: ty("u8"),
        body: FunctionBody {
            stmts: vec![],
            tail: Some(Expr::new(NodeId::new(10), ExprKind::Binary(BinOp::Add, Box::new(ident(0, "a")), Box::new(ident(1, "b"))), pos())),
        },
        is_pub: false,
        is_interrupt: false,
        pos: pos(),
    };
    let call = Expr::new(
        NodeId::new(11),
        ExprKind::Call { callee: Box::new(ident(2, "add")), args: vec![int_lit(3, 5), int_lit(4, 3)] },
        pos(),
    );
    let main = FunctionDecl {
        name: "main".into(),
        params: vec![],
        ret: ty("u8"),
        body: FunctionBody { stmts: vec![], tail: Some(call) },
        is_pub: true,
        is_interrupt: false,
        pos: pos(),
    };
    module.decls.push(Decl::Function(add));
    module.decls.push(Decl::Function(main));

    let opts = CompileOptions { enable_ctie: false, ..Default::default() };
    let out = minzc::compile(module, &opts).expect("compiles");
    let mir = out.mir.expect("mir should have been built");

    let main_id = mir.find_function("main").unwrap();
    assert!(mir.functions[main_id].instrs.iter().any(|i| i.opcode == Opcode::Call && i.symbol.as_deref() == Some("add")));
    assert!(mir.find_function("add").is_some(), "add must still be emitted without CTIE");
}

/// Scenario E (§8.4): `fun set_pixel(x: u8, y: u8) -> void { .. }`
/// compiled with `--enable-smc` gets the `smc` calling convention,
/// an SMC anchor per parameter, and a `PATCH_TABLE` entry per anchor.
#[test]
fn scenario_e_smc_parameter_passing() {
    let mut module = Module::new(None);

    let set_pixel = FunctionDecl {
        name: "set_pixel".into(),
        params: vec![Param { name: "x".into(), ty: ty("u8"), pos: pos() }, Param { name: "y".into(), ty: ty("u8"), pos: pos() }],
        ret: ty("void"),
        body: FunctionBody { stmts: vec![], tail: None },
        is_pub: false,
        is_interrupt: false,
        pos: pos(),
    };
    let call = Stmt::new(
        StmtKind::ExprStmt(Expr::new(
            NodeId::new(10),
            ExprKind::Call { callee: Box::new(ident(0, "set_pixel")), args: vec![int_lit(1, 10), int_lit(2, 20)] },
            pos(),
        )),
        pos(),
    );
    let main = FunctionDecl {
        name: "main".into(),
        params: vec![],
        ret: ty("void"),
        body: FunctionBody { stmts: vec![call], tail: None },
        is_pub: true,
        is_interrupt: false,
        pos: pos(),
    };
    module.decls.push(Decl::Function(set_pixel));
    module.decls.push(Decl::Function(main));

    let opts = CompileOptions { enable_smc: true, ..Default::default() };
    let out = minzc::compile(module, &opts).expect("compiles");
    assert!(!out.diagnostics.has_fatal());

    let mir = out.mir.as_ref().expect("mir should have been built");
    let set_pixel_id = mir.find_function("set_pixel").expect("set_pixel survives (called from main)");
    let f = &mir.functions[set_pixel_id];
    assert!(f.meta.uses_smc);
    let anchor_count = f.instrs.iter().filter(|i| i.opcode == Opcode::SmcAnchor).count();
    assert_eq!(anchor_count, 2, "one SMC anchor per parameter, found: {:#?}", f.instrs);

    let main_id = mir.find_function("main").expect("main survives");
    let main_f = &mir.functions[main_id];
    let patch_count = main_f.instrs.iter().filter(|i| i.opcode == Opcode::SmcPatch).count();
    assert_eq!(patch_count, 2, "main patches both of set_pixel's anchors before calling it, found: {:#?}", main_f.instrs);
    let call_has_no_srcs = main_f
        .instrs
        .iter()
        .find(|i| i.opcode == Opcode::Call && i.symbol.as_deref() == Some("set_pixel"))
        .map(|i| i.srcs.is_empty())
        .expect("main calls set_pixel");
    assert!(call_has_no_srcs, "arguments travel through patched anchors, not call-site registers, under the smc convention");

    let asm = out.assembly.expect("assembly should have been emitted");
    assert!(asm.contains("PATCH_TABLE:"));
    // The call site patches each anchor's immediate byte directly
    // before `CALL set_pixel` (§4.16 Scenario E).
    assert!(asm.contains("set_pixel$p0$imm0_imm"), "patch targets set_pixel's first anchor by name:\n{asm}");
    assert!(asm.contains("set_pixel$p1$imm0_imm"), "patch targets set_pixel's second anchor by name:\n{asm}");
    assert!(asm.contains("CALL set_pixel"));
    // One `DW <anchor>` / `DB <size>, <tag>` pair per anchor, plus the
    // terminating `DW 0` (§6.2).
    let patch_entries = asm.matches("    DW ").count() - 1; // minus the terminator
    assert_eq!(patch_entries, 2);
}

/// Scenario F (§8.4): two overloads of `f` where every call argument
/// needs exactly one widening against each candidate is ambiguous,
/// and must stop the pipeline before MIR is built (§4.17).
#[test]
fn scenario_f_ambiguous_overload_stops_before_mir() {
    let mut module = Module::new(None);

    let f_u8_u16 = FunctionDecl {
        name: "f".into(),
        params: vec![Param { name: "a".into(), ty: ty("u8"), pos: pos() }, Param { name: "b".into(), ty: ty("u16"), pos: pos() }],
        ret: ty("void"),
        body: FunctionBody { stmts: vec![], tail: None },
        is_pub: false,
        is_interrupt: false,
        pos: pos(),
    };
    let f_u16_u8 = FunctionDecl {
        name: "f".into(),
        params: vec![Param { name: "a".into(), ty: ty("u16"), pos: pos() }, Param { name: "b".into(), ty: ty("u8"), pos: pos() }],
        ret: ty("void"),
        body: FunctionBody { stmts: vec![], tail: None },
        is_pub: false,
        is_interrupt: false,
        pos: pos(),
    };
    let call = Stmt::new(
        StmtKind::ExprStmt(Expr::new(
            NodeId::new(10),
            ExprKind::Call { callee: Box::new(ident(0, "f")), args: vec![int_lit(1, 1), int_lit(2, 1)] },
            pos(),
        )),
        pos(),
    );
    let main = FunctionDecl {
        name: "main".into(),
        params: vec![],
        ret: ty("void"),
        body: FunctionBody { stmts: vec![call], tail: None },
        is_pub: true,
        is_interrupt: false,
        pos: pos(),
    };
    module.decls.push(Decl::Function(f_u8_u16));
    module.decls.push(Decl::Function(f_u16_u8));
    module.decls.push(Decl::Function(main));

    let out = minzc::compile(module, &CompileOptions::default()).expect("compile() itself does not error");
    assert!(out.diagnostics.has_fatal());
    assert!(out.mir.is_none(), "a fatal diagnostic must stop the pipeline before MIR construction (§4.17)");
    assert!(out.diagnostics.iter().any(|d| d.kind_str() == "AmbiguousOverload"));
}

/// Scenario A (§8.4), exercised end to end through assembly: two
/// overloads of `print` get distinct mangled labels and `main` calls
/// each one directly.
#[test]
fn scenario_a_overloads_get_distinct_call_sites_in_assembly() {
    let mut module = Module::new(None);
    let print_u8 = FunctionDecl {
        name: "print".into(),
        params: vec![Param { name: "v".into(), ty: ty("u8"), pos: pos() }],
        ret: ty("void"),
        body: FunctionBody { stmts: vec![], tail: None },
        is_pub: false,
        is_interrupt: false,
        pos: pos(),
    };
    let print_u16 = FunctionDecl {
        name: "print".into(),
        params: vec![Param { name: "v".into(), ty: ty("u16"), pos: pos() }],
        ret: ty("void"),
        body: FunctionBody { stmts: vec![], tail: None },
        is_pub: false,
        is_interrupt: false,
        pos: pos(),
    };
    let call_u8 = Stmt::new(
        StmtKind::ExprStmt(Expr::new(
            NodeId::new(10),
            ExprKind::Call { callee: Box::new(ident(0, "print")), args: vec![int_lit(1, 5)] },
            pos(),
        )),
        pos(),
    );
    let call_u16 = Stmt::new(
        StmtKind::ExprStmt(Expr::new(
            NodeId::new(11),
            ExprKind::Call { callee: Box::new(ident(2, "print")), args: vec![int_lit(3, 300)] },
            pos(),
        )),
        pos(),
    );
    let main = FunctionDecl {
        name: "main".into(),
        params: vec![],
        ret: ty("void"),
        body: FunctionBody { stmts: vec![call_u8, call_u16], tail: None },
        is_pub: true,
        is_interrupt: false,
        pos: pos(),
    };
    module.decls.push(Decl::Function(print_u8));
    module.decls.push(Decl::Function(print_u16));
    module.decls.push(Decl::Function(main));

    // CTIE would happily fold these no-op bodies away; disable it so
    // the call sites this test is about actually survive to assembly.
    let opts = CompileOptions { enable_ctie: false, ..Default::default() };
    let out = minzc::compile(module, &opts).expect("compiles");
    assert!(!out.diagnostics.has_fatal());
    let asm = out.assembly.expect("assembly should have been emitted");

    assert!(asm.contains("print$u8:"));
    assert!(asm.contains("print$u16:"));
    assert!(asm.contains("CALL print$u8"));
    assert!(asm.contains("CALL print$u16"));
}

/// Scenario D (§8.4): `xs.iter().map(..).filter(..).forEach(..)` sitting
/// in a statement (not the function's tail expression) still gets its
/// three lambdas hoisted and fused into a single loop.
#[test]
fn scenario_d_iterator_chain_in_a_statement_fuses_into_one_loop() {
    use minz_ast::{ArrayLen, IterStage, LambdaParam};

    let mut module = Module::new(None);

    fn lambda_id(id: u32, param: &str, body: Expr) -> Expr {
        Expr::new(
            NodeId::new(id as usize),
            ExprKind::Lambda { params: vec![LambdaParam { name: param.into(), ty: None, pos: pos() }], ret: None, body: Box::new(body) },
            pos(),
        )
    }

    let xs_ty = TypeRef::Array(Box::new(ty("u8")), ArrayLen::Literal(3), pos());
    let xs_lit = Expr::new(
        NodeId::new(1),
        ExprKind::ArrayLiteral(vec![int_lit(2, 1), int_lit(3, 2), int_lit(4, 3)]),
        pos(),
    );
    let let_xs = Stmt::new(StmtKind::Let { name: "xs".into(), mutable: false, ty: Some(xs_ty), value: xs_lit }, pos());

    let map_fn = lambda_id(10, "x", ident(11, "x"));
    let filter_fn = lambda_id(
        12,
        "x",
        Expr::new(NodeId::new(13), ExprKind::Binary(BinOp::Gt, Box::new(ident(14, "x")), Box::new(int_lit(15, 1))), pos()),
    );
    let foreach_fn = lambda_id(16, "x", ident(17, "x"));

    let chain = Expr::new(
        NodeId::new(20),
        ExprKind::IterChain {
            source: Box::new(ident(21, "xs")),
            stages: vec![IterStage::Map(Box::new(map_fn)), IterStage::Filter(Box::new(filter_fn)), IterStage::ForEach(Box::new(foreach_fn))],
        },
        pos(),
    );
    let chain_stmt = Stmt::new(StmtKind::ExprStmt(chain), pos());

    let main = FunctionDecl {
        name: "main".into(),
        params: vec![],
        ret: ty("void"),
        body: FunctionBody { stmts: vec![let_xs, chain_stmt], tail: None },
        is_pub: true,
        is_interrupt: false,
        pos: pos(),
    };
    module.decls.push(Decl::Function(main));

    let opts = CompileOptions { enable_ctie: false, ..Default::default() };
    let out = minzc::compile(module, &opts).expect("compiles");
    assert!(!out.diagnostics.has_fatal(), "unexpected diagnostics: {:#?}", out.diagnostics.iter().collect::<Vec<_>>());

    let mir = out.mir.expect("mir should have been built");
    assert!(mir.find_function("main$lambda_0").is_some(), "map lambda must be hoisted");
    assert!(mir.find_function("main$lambda_1").is_some(), "filter lambda must be hoisted");
    assert!(mir.find_function("main$lambda_2").is_some(), "forEach lambda must be hoisted");

    let main_id = mir.find_function("main").expect("main survives");
    let main_fn = &mir.functions[main_id];
    let djnz_labels = main_fn.instrs.iter().filter(|i| i.djnz.is_some()).count();
    assert_eq!(djnz_labels, 1, "a single DJNZ loop must drive the whole fused chain, found: {:#?}", main_fn.instrs);

    let calls: Vec<&str> = main_fn.instrs.iter().filter(|i| i.opcode == Opcode::Call).filter_map(|i| i.symbol.as_deref()).collect();
    assert_eq!(
        calls,
        vec!["main$lambda_0", "main$lambda_1", "main$lambda_2"],
        "the loop body calls map, then filter, then forEach directly, in order"
    );
}

/// A Spectrum target reaches the emitted `ORG` directive end to end,
/// not just through `minzc`'s own unit tests (§6.3, §6.4).
#[test]
fn spectrum_target_sets_the_origin_address() {
    let mut module = Module::new(None);
    module.decls.push(Decl::Function(FunctionDecl {
        name: "main".into(),
        params: vec![],
        ret: ty("void"),
        body: FunctionBody { stmts: vec![], tail: None },
        is_pub: true,
        is_interrupt: false,
        pos: pos(),
    }));
    let opts = CompileOptions { target: TargetConfig { target: Target::Spectrum, debug: false }, ..Default::default() };
    let out = minzc::compile(module, &opts).unwrap();
    let asm = out.assembly.unwrap();
    assert!(asm.lines().next().unwrap().to_uppercase().starts_with("ORG"));
}
