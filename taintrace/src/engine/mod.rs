//! Taint and symbolic evaluation, as seen by the tracer.

pub mod registers;
pub mod shadow;

pub use shadow::ShadowEngine;

use crate::error::EngineError;
use crate::host::Registers;
use crate::instruction::{Instruction, SymbolicId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    ProgramCounter,
    Flags,
    Named(&'static str),
}

pub trait Engine {
    /// Fill in disassembly, operands and branch information from the opcode bytes.
    fn disassemble(&mut self, inst: &mut Instruction) -> Result<(), EngineError>;

    /// Propagate taint and build symbolic expressions for `inst`, updating its flags.
    fn build_semantics(
        &mut self,
        inst: &mut Instruction,
        regs: &dyn Registers,
    ) -> Result<(), EngineError>;

    /// Id of the newest symbolic expression assigned to `reg`.
    fn symbolic_register_id(&self, reg: Register) -> Option<SymbolicId>;

    /// Human-readable form of the expressions `inst` produced.
    fn symbolic_expressions(&self, inst: &Instruction) -> Vec<String>;

    /// Drop all taint and symbolic state.
    fn reset(&mut self);

    fn enable_taint(&mut self, enabled: bool);
    fn enable_symbolic(&mut self, enabled: bool);
    fn is_taint_enabled(&self) -> bool;
    fn is_symbolic_enabled(&self) -> bool;

    /// Mark a register as a taint (and symbolic) source.
    fn taint_register(&mut self, name: &str) -> Result<(), EngineError>;
    fn taint_memory(&mut self, address: u64, len: u64);
    fn is_register_tainted(&self, name: &str) -> bool;
    fn is_memory_tainted(&self, address: u64) -> bool;
}
