//! The MIR data model and MIR Builder (spec §3.5, §4.9).
//!
//! A [`module::MirModule`] is an ordered list of [`function::MirFunction`]s
//! plus global data; each function owns its own flat
//! [`instr::Instruction`] stream over virtual registers
//! ([`entities::Reg`]). [`builder::build_module`] is the only entry
//! point that turns a `minz_sema`-analyzed AST into one.

pub mod builder;
pub mod entities;
pub mod function;
pub mod instr;
pub mod module;
