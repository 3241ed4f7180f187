//! Compile-Time Interface Execution (spec §4.11): an interpreter over
//! pure MIR functions that, given all-constant arguments, evaluates
//! the call at compile time and replaces it with a `const-result`
//! instead of emitting the call.
//!
//! This is the one place the compiler runs untrusted-looking
//! arithmetic before code generation, so it is bounded the way an
//! interpreter embedded in a compiler has to be: a call-depth cap and
//! a per-call instruction-budget cap, both configurable, matching the
//! defaults spec §4.11 names (256 / 1,000,000).

use minz_diagnostics::{Diagnostic, Position};
use minz_mir::entities::{FuncId, Reg};
use minz_mir::function::MirFunction;
use minz_mir::instr::{Opcode, Signedness};
use minz_mir::module::MirModule;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy)]
pub struct CtieConfig {
    pub max_depth: u32,
    pub max_iterations: u64,
}

impl Default for CtieConfig {
    fn default() -> Self {
        CtieConfig { max_depth: 256, max_iterations: 1_000_000 }
    }
}

/// The result of attempting to fold one call.
pub enum CtieOutcome {
    /// The call site can be replaced with this constant.
    Evaluated(i64),
    /// Not attempted: the callee isn't pure, or an argument wasn't a
    /// compile-time constant. No diagnostic — this is the common case
    /// and not an error, the call is simply left as a runtime call.
    NotEligible,
    /// Attempted and failed: the call site keeps its runtime call and
    /// the diagnostic is surfaced as specified by §4.17 (non-fatal —
    /// CTIE failure degrades to "don't fold this one", not a hard stop).
    Failed(Diagnostic),
}

struct Interpreter<'m> {
    module: &'m MirModule,
    config: CtieConfig,
    iterations: u64,
}

enum Flow {
    Continue,
    Return(i64),
}

impl<'m> Interpreter<'m> {
    fn run(&mut self, f: &MirFunction, args: &[i64], depth: u32) -> Result<i64, Diagnostic> {
        if depth > self.config.max_depth {
            return Err(Diagnostic::CtieDepthExceeded { pos: Position::synthetic(), limit: self.config.max_depth });
        }

        let labels = index_labels(f);
        let mut regs: FxHashMap<Reg, i64> = FxHashMap::default();
        let mut pc: usize = 0;

        loop {
            if pc >= f.instrs.len() {
                return Ok(0);
            }
            self.iterations += 1;
            if self.iterations > self.config.max_iterations {
                return Err(Diagnostic::CtieIterationCapExceeded { pos: Position::synthetic(), limit: self.config.max_iterations });
            }

            let instr = &f.instrs[pc];
            match self.step(instr, &mut regs, args, depth)? {
                Flow::Continue => pc += 1,
                Flow::Return(v) => return Ok(v),
            }
            if let Some(target) = self.jump_target(instr, &regs, &labels)? {
                pc = target;
            }
        }
    }

    /// Executes the non-control-flow effect of `instr`; jump targets
    /// are resolved separately by `jump_target` so both ends of a
    /// conditional branch share one lookup.
    fn step(
        &mut self,
        instr: &minz_mir::instr::Instruction,
        regs: &mut FxHashMap<Reg, i64>,
        args: &[i64],
        depth: u32,
    ) -> Result<Flow, Diagnostic> {
        use Opcode::*;
        let src = |regs: &FxHashMap<Reg, i64>, i: usize| -> i64 { instr.srcs.get(i).and_then(|r| regs.get(r)).copied().unwrap_or(0) };

        match instr.opcode {
            LoadConst => {
                if let Some(d) = instr.dest {
                    regs.insert(d, instr.imm.unwrap_or(0));
                }
                Ok(Flow::Continue)
            }
            LoadParam => {
                if let Some(d) = instr.dest {
                    let idx = instr.imm.unwrap_or(0) as usize;
                    regs.insert(d, args.get(idx).copied().unwrap_or(0));
                }
                Ok(Flow::Continue)
            }
            Move => {
                if let Some(d) = instr.dest {
                    regs.insert(d, src(regs, 0));
                }
                Ok(Flow::Continue)
            }
            Add | Sub | Mul | Div(_) | Mod(_) | And | Or | Xor | Shl | Shr(_) | Eq | Ne | Lt(_) | Le(_) | Gt(_) | Ge(_) => {
                let a = src(regs, 0);
                let b = src(regs, 1);
                let v = self.eval_binop(instr.opcode, a, b)?;
                if let Some(d) = instr.dest {
                    regs.insert(d, v);
                }
                Ok(Flow::Continue)
            }
            Neg => {
                if let Some(d) = instr.dest {
                    regs.insert(d, -src(regs, 0));
                }
                Ok(Flow::Continue)
            }
            Jump | JumpIfZero | JumpIfNonZero | Label => Ok(Flow::Continue),
            Return => Ok(Flow::Return(instr.srcs.first().and_then(|r| regs.get(r)).copied().unwrap_or(0))),
            Call => {
                let callee_name = instr.symbol.as_deref().ok_or_else(|| undefined_behavior("call with no target symbol"))?;
                let callee_id = self.module.find_function(callee_name).ok_or_else(|| undefined_behavior("call to an unknown function"))?;
                let callee = &self.module.functions[callee_id];
                if !callee.meta.is_pure {
                    return Err(undefined_behavior("call to a non-pure function inside a compile-time evaluation"));
                }
                let call_args: Vec<i64> = instr.srcs.iter().map(|r| regs.get(r).copied().unwrap_or(0)).collect();
                let v = self.run(callee, &call_args, depth + 1)?;
                if let Some(d) = instr.dest {
                    regs.insert(d, v);
                }
                Ok(Flow::Continue)
            }
            CompileTimeKnown | ConstResult => Ok(Flow::Continue),
            _ => Err(undefined_behavior("instruction not representable at compile time")),
        }
    }

    fn eval_binop(&self, op: Opcode, a: i64, b: i64) -> Result<i64, Diagnostic> {
        use Opcode::*;
        Ok(match op {
            Add => a.wrapping_add(b),
            Sub => a.wrapping_sub(b),
            Mul => a.wrapping_mul(b),
            Div(Signedness::Signed) | Div(Signedness::Unsigned) => {
                if b == 0 {
                    return Err(Diagnostic::CompileTimeTrap { pos: Position::synthetic(), reason: "division by zero".into() });
                }
                a.wrapping_div(b)
            }
            Mod(Signedness::Signed) | Mod(Signedness::Unsigned) => {
                if b == 0 {
                    return Err(Diagnostic::CompileTimeTrap { pos: Position::synthetic(), reason: "modulo by zero".into() });
                }
                a.wrapping_rem(b)
            }
            And => a & b,
            Or => a | b,
            Xor => a ^ b,
            Shl => a.wrapping_shl(b as u32),
            Shr(Signedness::Signed) => a.wrapping_shr(b as u32),
            Shr(Signedness::Unsigned) => ((a as u64).wrapping_shr(b as u32)) as i64,
            Eq => (a == b) as i64,
            Ne => (a != b) as i64,
            Lt(_) => (a < b) as i64,
            Le(_) => (a <= b) as i64,
            Gt(_) => (a > b) as i64,
            Ge(_) => (a >= b) as i64,
            _ => unreachable!("eval_binop called with a non-binary opcode"),
        })
    }

    fn jump_target(
        &self,
        instr: &minz_mir::instr::Instruction,
        regs: &FxHashMap<Reg, i64>,
        labels: &FxHashMap<String, usize>,
    ) -> Result<Option<usize>, Diagnostic> {
        match instr.opcode {
            Opcode::Jump => resolve_label(instr, labels).map(Some),
            Opcode::JumpIfZero => {
                let cond = instr.srcs.first().and_then(|r| regs.get(r)).copied().unwrap_or(0);
                if cond == 0 {
                    resolve_label(instr, labels).map(Some)
                } else {
                    Ok(None)
                }
            }
            Opcode::JumpIfNonZero => {
                let cond = instr.srcs.first().and_then(|r| regs.get(r)).copied().unwrap_or(0);
                if cond != 0 {
                    resolve_label(instr, labels).map(Some)
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }
}

fn resolve_label(instr: &minz_mir::instr::Instruction, labels: &FxHashMap<String, usize>) -> Result<usize, Diagnostic> {
    let name = instr.symbol.as_deref().ok_or_else(|| undefined_behavior("branch with no target label"))?;
    labels.get(name).copied().ok_or_else(|| undefined_behavior("branch to an unresolved label"))
}

fn index_labels(f: &MirFunction) -> FxHashMap<String, usize> {
    let mut labels = FxHashMap::default();
    for (i, instr) in f.instrs.iter().enumerate() {
        if instr.opcode == Opcode::Label {
            if let Some(name) = &instr.symbol {
                labels.insert(name.clone(), i);
            }
        }
    }
    labels
}

fn undefined_behavior(reason: &str) -> Diagnostic {
    Diagnostic::CtieUndefinedBehavior { pos: Position::synthetic(), reason: reason.to_string() }
}

/// Attempts to fold one call to `func_id` with the given argument
/// values, which the caller has already established are all
/// compile-time constants (§4.11: "every actual argument is a known
/// constant at the call site").
pub fn try_fold_call(module: &MirModule, func_id: FuncId, args: &[i64], config: CtieConfig) -> CtieOutcome {
    let f = &module.functions[func_id];
    if !f.meta.is_pure {
        return CtieOutcome::NotEligible;
    }
    let mut interp = Interpreter { module, config, iterations: 0 };
    match interp.run(f, args, 0) {
        Ok(v) => CtieOutcome::Evaluated(v),
        Err(d) => CtieOutcome::Failed(d),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_mir::function::CallConvention;
    use minz_mir::instr::Instruction;
    use minz_types::Type;

    fn reg(n: u32) -> Reg {
        use minz_entity::EntityRef;
        Reg::new(n as usize)
    }

    fn double_fn() -> MirFunction {
        let mut f = MirFunction::new("double", CallConvention::Register, Type::U8);
        f.new_reg(Type::U8);
        f.push(Instruction::new(Opcode::LoadParam).with_dest(reg(0)).with_imm(0));
        f.push(Instruction::new(Opcode::Add).with_dest(reg(0)).with_src(reg(0)).with_src(reg(0)));
        f.push(Instruction::new(Opcode::Return).with_src(reg(0)));
        f.meta.is_pure = true;
        f
    }

    #[test]
    fn folds_pure_arithmetic_with_constant_args() {
        let mut module = MirModule::new();
        let id = module.add_function(double_fn());
        match try_fold_call(&module, id, &[21], CtieConfig::default()) {
            CtieOutcome::Evaluated(v) => assert_eq!(v, 42),
            _ => panic!("expected a folded constant"),
        }
    }

    #[test]
    fn declines_impure_functions() {
        let mut module = MirModule::new();
        let mut f = double_fn();
        f.meta.is_pure = false;
        let id = module.add_function(f);
        assert!(matches!(try_fold_call(&module, id, &[1], CtieConfig::default()), CtieOutcome::NotEligible));
    }

    #[test]
    fn division_by_zero_traps() {
        let mut module = MirModule::new();
        let mut f = MirFunction::new("bad_div", CallConvention::Register, Type::U8);
        f.new_reg(Type::U8);
        f.new_reg(Type::U8);
        f.push(Instruction::new(Opcode::LoadConst).with_dest(reg(0)).with_imm(10));
        f.push(Instruction::new(Opcode::LoadConst).with_dest(reg(1)).with_imm(0));
        f.push(Instruction::new(Opcode::Div(Signedness::Unsigned)).with_dest(reg(0)).with_src(reg(0)).with_src(reg(1)));
        f.push(Instruction::new(Opcode::Return).with_src(reg(0)));
        f.meta.is_pure = true;
        let id = module.add_function(f);
        match try_fold_call(&module, id, &[], CtieConfig::default()) {
            CtieOutcome::Failed(Diagnostic::CompileTimeTrap { .. }) => {}
            _ => panic!("expected a compile-time trap"),
        }
    }

    #[test]
    fn depth_cap_is_enforced_on_recursive_calls() {
        let mut module = MirModule::new();
        let mut f = MirFunction::new("loopback", CallConvention::Register, Type::U8);
        f.push(Instruction::new(Opcode::Call).with_symbol("loopback"));
        f.push(Instruction::new(Opcode::Return));
        f.meta.is_pure = true;
        let id = module.add_function(f);
        let config = CtieConfig { max_depth: 4, max_iterations: 1_000_000 };
        match try_fold_call(&module, id, &[], config) {
            CtieOutcome::Failed(Diagnostic::CtieDepthExceeded { limit, .. }) => assert_eq!(limit, 4),
            other => panic!("expected depth-exceeded, got evaluation to proceed: {}", matches!(other, CtieOutcome::Evaluated(_))),
        }
    }
}
