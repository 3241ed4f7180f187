//! Compile-time currying via `@curry` (spec §4.5).
//!
//! `@curry(lambda_expr, value)` type-checks here (see
//! `TypeChecker::check_expr`'s `ExprKind::Curry` arm, which drops the
//! lambda's first parameter from its `Function` type) but the actual
//! specialization — cloning the hoisted function, patching an
//! `smc-anchor` for the captured value, and queuing the result as a
//! new top-level function — happens in `minz_mir::builder::lower_curry`,
//! since the anchor and the forwarding tail-call it builds are
//! MIR/codegen concepts this crate has no model for.
