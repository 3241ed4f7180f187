//! Entity references used inside a MIR function/module (spec §3.5).

use minz_entity::entity_impl;

/// A virtual register, unbounded per function (`r1, r2, …`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(u32);
entity_impl!(Reg, "r");

/// A function within a [`crate::module::MirModule`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(u32);
entity_impl!(FuncId, "f");

/// A global data object (string literal, constant table, global
/// variable cell).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataId(u32);
entity_impl!(DataId, "d");
