//! Shadow-state taint and symbolic engine for x86-64.
//!
//! Registers and memory bytes carry a taint bit and, when the symbolic engine
//! is on, the id of the last expression written to them. Expressions are kept
//! as text; nothing here tries to solve them.

use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter, Result as DisplayResult};

use log::trace;
use yaxpeax_arch::LengthedInstruction;
use yaxpeax_x86::amd64::{
    DisplayStyle, InstDecoder, Instruction as X86Instruction, Opcode, Operand as X86Operand,
    RegSpec,
};

use crate::engine::registers::{self, canonical, flag, Flag, FLAGS, PC};
use crate::engine::{Engine, Register};
use crate::error::{EngineError, Opcodes};
use crate::host::Registers;
use crate::instruction::{Instruction, Operand, OperandKind, SymbolicId};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Register(String),
    Memory(u64, u8),
    Constant,
    Unknown,
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter) -> DisplayResult {
        match self {
            Location::Register(name) => write!(f, "{}", name),
            Location::Memory(address, size) => write!(f, "[0x{:x}]:{}", address, size),
            Location::Constant => write!(f, "const"),
            Location::Unknown => write!(f, "?"),
        }
    }
}

/// How an instruction moves data between its operands.
enum Effect {
    Assign,
    Address,
    Update,
    Compare,
    Clear,
    Push,
    Pop,
    Branch,
    Untracked,
}

fn is_conditional_branch(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::JA
            | Opcode::JB
            | Opcode::JRCXZ
            | Opcode::JG
            | Opcode::JGE
            | Opcode::JL
            | Opcode::JLE
            | Opcode::JNA
            | Opcode::JNB
            | Opcode::JNO
            | Opcode::JNP
            | Opcode::JNS
            | Opcode::JNZ
            | Opcode::JO
            | Opcode::JP
            | Opcode::JS
            | Opcode::JZ
            | Opcode::LOOP
            | Opcode::LOOPNZ
            | Opcode::LOOPZ
    )
}

fn uses_counter(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::JRCXZ | Opcode::LOOP | Opcode::LOOPNZ | Opcode::LOOPZ
    )
}

fn condition_taken(opcode: Opcode, regs: &dyn Registers) -> bool {
    let rflags = regs.register(FLAGS).unwrap_or(0);
    let rcx = regs.register("rcx").unwrap_or(0);
    let f = |fl: Flag| flag(rflags, fl);

    match opcode {
        Opcode::JO => f(Flag::Overflow),
        Opcode::JNO => !f(Flag::Overflow),
        Opcode::JB => f(Flag::Carry),
        Opcode::JNB => !f(Flag::Carry),
        Opcode::JZ => f(Flag::Zero),
        Opcode::JNZ => !f(Flag::Zero),
        Opcode::JNA => f(Flag::Carry) || f(Flag::Zero),
        Opcode::JA => !f(Flag::Carry) && !f(Flag::Zero),
        Opcode::JS => f(Flag::Sign),
        Opcode::JNS => !f(Flag::Sign),
        Opcode::JP => f(Flag::Parity),
        Opcode::JNP => !f(Flag::Parity),
        Opcode::JL => f(Flag::Sign) != f(Flag::Overflow),
        Opcode::JGE => f(Flag::Sign) == f(Flag::Overflow),
        Opcode::JLE => f(Flag::Zero) || f(Flag::Sign) != f(Flag::Overflow),
        Opcode::JG => !f(Flag::Zero) && f(Flag::Sign) == f(Flag::Overflow),
        Opcode::JRCXZ => rcx == 0,
        // rcx is decremented before the test
        Opcode::LOOP => rcx != 1,
        Opcode::LOOPZ => rcx != 1 && f(Flag::Zero),
        Opcode::LOOPNZ => rcx != 1 && !f(Flag::Zero),
        _ => false,
    }
}

fn immediate(op: &X86Operand) -> Option<i64> {
    match *op {
        X86Operand::ImmediateI8(imm) => Some(imm as i64),
        X86Operand::ImmediateU8(imm) => Some(imm as i64),
        X86Operand::ImmediateI16(imm) => Some(imm as i64),
        X86Operand::ImmediateU16(imm) => Some(imm as i64),
        X86Operand::ImmediateI32(imm) => Some(imm as i64),
        X86Operand::ImmediateU32(imm) => Some(imm as i64),
        X86Operand::ImmediateI64(imm) => Some(imm),
        X86Operand::ImmediateU64(imm) => Some(imm as i64),
        _ => None,
    }
}

/// Registers an addressing mode reads, in encoding order.
fn address_registers(op: &X86Operand) -> Vec<&RegSpec> {
    match op {
        X86Operand::RegDeref(base) | X86Operand::RegDisp(base, _) => vec![base],
        X86Operand::RegScale(index, _) | X86Operand::RegScaleDisp(index, _, _) => vec![index],
        X86Operand::RegIndexBase(base, index)
        | X86Operand::RegIndexBaseDisp(base, index, _)
        | X86Operand::RegIndexBaseScale(base, index, _)
        | X86Operand::RegIndexBaseScaleDisp(base, index, _, _) => vec![base, index],
        _ => Vec::new(),
    }
}

fn is_memory(op: &X86Operand) -> bool {
    matches!(
        op,
        X86Operand::DisplacementU32(_)
            | X86Operand::DisplacementU64(_)
            | X86Operand::RegDeref(_)
            | X86Operand::RegDisp(_, _)
            | X86Operand::RegScale(_, _)
            | X86Operand::RegScaleDisp(_, _, _)
            | X86Operand::RegIndexBase(_, _)
            | X86Operand::RegIndexBaseDisp(_, _, _)
            | X86Operand::RegIndexBaseScale(_, _, _)
            | X86Operand::RegIndexBaseScaleDisp(_, _, _, _)
    )
}

fn effective_address(op: &X86Operand, next_address: u64, regs: &dyn Registers) -> Option<u64> {
    let reg = |spec: &RegSpec| -> Option<u64> {
        let name = canonical(&spec.to_string());
        if name == PC {
            Some(next_address)
        } else {
            regs.register(&name)
        }
    };
    let disp = |d: i32| d as i64 as u64;

    match op {
        X86Operand::DisplacementU32(d) => Some(*d as u64),
        X86Operand::DisplacementU64(d) => Some(*d),
        X86Operand::RegDeref(base) => reg(base),
        X86Operand::RegDisp(base, d) => Some(reg(base)?.wrapping_add(disp(*d))),
        X86Operand::RegScale(index, scale) => Some(reg(index)?.wrapping_mul(*scale as u64)),
        X86Operand::RegScaleDisp(index, scale, d) => Some(
            reg(index)?
                .wrapping_mul(*scale as u64)
                .wrapping_add(disp(*d)),
        ),
        X86Operand::RegIndexBase(base, index) => Some(reg(base)?.wrapping_add(reg(index)?)),
        X86Operand::RegIndexBaseDisp(base, index, d) => Some(
            reg(base)?
                .wrapping_add(reg(index)?)
                .wrapping_add(disp(*d)),
        ),
        X86Operand::RegIndexBaseScale(base, index, scale) => {
            Some(reg(base)?.wrapping_add(reg(index)?.wrapping_mul(*scale as u64)))
        }
        X86Operand::RegIndexBaseScaleDisp(base, index, scale, d) => Some(
            reg(base)?
                .wrapping_add(reg(index)?.wrapping_mul(*scale as u64))
                .wrapping_add(disp(*d)),
        ),
        _ => None,
    }
}

pub struct ShadowEngine {
    decoder: InstDecoder,
    taint_enabled: bool,
    symbolic_enabled: bool,
    tainted_regs: HashSet<String>,
    tainted_mem: HashSet<u64>,
    symbolic_regs: HashMap<String, SymbolicId>,
    symbolic_mem: HashMap<u64, SymbolicId>,
    expressions: Vec<String>,
    variables: usize,
}

impl Default for ShadowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowEngine {
    pub fn new() -> Self {
        Self {
            decoder: InstDecoder::default(),
            taint_enabled: true,
            symbolic_enabled: false,
            tainted_regs: HashSet::new(),
            tainted_mem: HashSet::new(),
            symbolic_regs: HashMap::new(),
            symbolic_mem: HashMap::new(),
            expressions: Vec::new(),
            variables: 0,
        }
    }

    pub fn expression(&self, id: SymbolicId) -> Option<&str> {
        self.expressions.get(id).map(String::as_str)
    }

    fn decode(&self, opcode: &[u8]) -> Result<X86Instruction, EngineError> {
        let decoded = self
            .decoder
            .decode_slice(opcode)
            .map_err(|_| EngineError::InvalidOpcode(Opcodes(opcode.to_vec())))?;
        // trailing bytes mean the host and the decoder disagree on the length
        if decoded.len().to_const() as usize != opcode.len() {
            return Err(EngineError::InvalidOpcode(Opcodes(opcode.to_vec())));
        }
        Ok(decoded)
    }

    /// Operand records plus where each one lives in the shadow state.
    fn operands(
        &self,
        decoded: &X86Instruction,
        inst: &Instruction,
        regs: Option<&dyn Registers>,
    ) -> Vec<(OperandKind, Location)> {
        let ops: Vec<X86Operand> = (0..decoded.operand_count())
            .map(|i| decoded.operand(i))
            .collect();

        // the register width is only a guess for accesses yaxpeax cannot size
        let size = decoded
            .mem_size()
            .and_then(|access| access.bytes_size())
            .or_else(|| {
                ops.iter().find_map(|op| match op {
                    X86Operand::Register(spec) => Some(registers::size_of(&spec.to_string())),
                    _ => None,
                })
            })
            .unwrap_or(8);

        let mut out = Vec::new();
        for op in ops.iter() {
            match op {
                X86Operand::Register(spec) => {
                    let name = spec.to_string();
                    out.push((
                        OperandKind::Register(name.clone()),
                        Location::Register(canonical(&name)),
                    ));
                }
                X86Operand::Nothing => {}
                op if is_memory(op) => {
                    let address =
                        regs.and_then(|regs| effective_address(op, inst.next_address, regs));
                    let location = match address {
                        Some(address) => Location::Memory(address, size),
                        None => Location::Unknown,
                    };
                    out.push((OperandKind::Memory { address, size }, location));
                }
                op => match immediate(op) {
                    Some(imm) if is_conditional_branch(decoded.opcode()) => {
                        let target = (inst.next_address as i64).wrapping_add(imm) as u64;
                        out.push((OperandKind::Immediate(target), Location::Constant));
                    }
                    Some(imm) => out.push((OperandKind::Immediate(imm as u64), Location::Constant)),
                    None => out.push((OperandKind::Immediate(0), Location::Unknown)),
                },
            }
        }
        out
    }

    fn effect(decoded: &X86Instruction, locations: &[Location]) -> Effect {
        match decoded.opcode() {
            opcode if is_conditional_branch(opcode) => Effect::Branch,
            Opcode::MOV | Opcode::MOVZX | Opcode::MOVSX | Opcode::MOVSXD => Effect::Assign,
            Opcode::LEA => Effect::Address,
            Opcode::CMP | Opcode::TEST => Effect::Compare,
            Opcode::XOR | Opcode::SUB
                if locations.len() == 2 && locations[0] == locations[1] =>
            {
                Effect::Clear
            }
            Opcode::PUSH => Effect::Push,
            Opcode::POP => Effect::Pop,
            Opcode::JMP | Opcode::CALL | Opcode::RETURN | Opcode::NOP => Effect::Untracked,
            _ => Effect::Update,
        }
    }

    fn is_tainted_at(&self, location: &Location) -> bool {
        match location {
            Location::Register(name) => self.tainted_regs.contains(name),
            Location::Memory(address, size) => (0..*size as u64)
                .any(|i| self.tainted_mem.contains(&address.wrapping_add(i))),
            Location::Constant | Location::Unknown => false,
        }
    }

    fn set_taint(&mut self, location: &Location, tainted: bool) {
        match location {
            Location::Register(name) => {
                if tainted {
                    self.tainted_regs.insert(name.clone());
                } else {
                    self.tainted_regs.remove(name);
                }
            }
            Location::Memory(address, size) => {
                for i in 0..*size as u64 {
                    if tainted {
                        self.tainted_mem.insert(address.wrapping_add(i));
                    } else {
                        self.tainted_mem.remove(&address.wrapping_add(i));
                    }
                }
            }
            Location::Constant | Location::Unknown => {}
        }
    }

    fn symbolic_at(&self, location: &Location) -> Option<SymbolicId> {
        match location {
            Location::Register(name) => self.symbolic_regs.get(name).copied(),
            Location::Memory(address, size) => (0..*size as u64)
                .filter_map(|i| self.symbolic_mem.get(&address.wrapping_add(i)).copied())
                .max(),
            Location::Constant | Location::Unknown => None,
        }
    }

    fn set_symbolic(&mut self, location: &Location, id: Option<SymbolicId>) {
        match location {
            Location::Register(name) => match id {
                Some(id) => {
                    self.symbolic_regs.insert(name.clone(), id);
                }
                None => {
                    self.symbolic_regs.remove(name);
                }
            },
            Location::Memory(address, size) => {
                for i in 0..*size as u64 {
                    let byte = address.wrapping_add(i);
                    match id {
                        Some(id) => {
                            self.symbolic_mem.insert(byte, id);
                        }
                        None => {
                            self.symbolic_mem.remove(&byte);
                        }
                    }
                }
            }
            Location::Constant | Location::Unknown => {}
        }
    }

    fn new_expression(&mut self, text: String) -> SymbolicId {
        let id = self.expressions.len();
        trace!("#{} = {}", id, text);
        self.expressions.push(format!("#{} = {}", id, text));
        id
    }

    fn new_variable(&mut self, origin: &str) -> SymbolicId {
        let var = self.variables;
        self.variables += 1;
        self.new_expression(format!("SymVar_{} ({})", var, origin))
    }
}

impl Engine for ShadowEngine {
    fn disassemble(&mut self, inst: &mut Instruction) -> Result<(), EngineError> {
        let decoded = self.decode(&inst.opcode)?;
        inst.disassembly = decoded.display_with(DisplayStyle::Intel).to_string();
        inst.next_address = inst.address.wrapping_add(inst.opcode.len() as u64);
        inst.operands = self
            .operands(&decoded, inst, None)
            .into_iter()
            .map(|(kind, _)| Operand::new(kind))
            .collect();
        inst.branch = is_conditional_branch(decoded.opcode());
        inst.branch_target = if inst.branch {
            inst.operands.iter().find_map(|op| match op.kind {
                OperandKind::Immediate(target) => Some(target),
                _ => None,
            })
        } else {
            None
        };
        Ok(())
    }

    fn build_semantics(
        &mut self,
        inst: &mut Instruction,
        regs: &dyn Registers,
    ) -> Result<(), EngineError> {
        let decoded = self.decode(&inst.opcode)?;
        let resolved = self.operands(&decoded, inst, Some(regs));
        let locations: Vec<Location> = resolved.iter().map(|(_, loc)| loc.clone()).collect();

        inst.operands = resolved
            .into_iter()
            .map(|(kind, location)| {
                let mut op = Operand::new(kind);
                op.tainted = self.taint_enabled && self.is_tainted_at(&location);
                op
            })
            .collect();

        let flags = Location::Register(FLAGS.to_string());
        let first = locations.first().cloned();
        let rsp = regs.register("rsp").unwrap_or(0);

        let (sources, dests): (Vec<Location>, Vec<Location>) =
            match Self::effect(&decoded, &locations) {
                Effect::Assign => (
                    locations.iter().skip(1).cloned().collect(),
                    first.into_iter().collect(),
                ),
                Effect::Address => {
                    let sources = (0..decoded.operand_count())
                        .map(|i| decoded.operand(i))
                        .filter(is_memory)
                        .flat_map(|op| {
                            address_registers(&op)
                                .into_iter()
                                .map(|spec| Location::Register(canonical(&spec.to_string())))
                                .collect::<Vec<_>>()
                        })
                        .collect();
                    (sources, first.into_iter().collect())
                }
                Effect::Update => {
                    let mut dests: Vec<Location> = first.into_iter().collect();
                    dests.push(flags);
                    (locations.clone(), dests)
                }
                Effect::Compare => (locations.clone(), vec![flags]),
                Effect::Clear => {
                    let mut dests: Vec<Location> = first.into_iter().collect();
                    dests.push(flags);
                    (Vec::new(), dests)
                }
                Effect::Push => (
                    first.into_iter().collect(),
                    vec![Location::Memory(rsp.wrapping_sub(8), 8)],
                ),
                Effect::Pop => (vec![Location::Memory(rsp, 8)], first.into_iter().collect()),
                Effect::Branch => {
                    if uses_counter(decoded.opcode()) {
                        (vec![flags, Location::Register("rcx".to_string())], Vec::new())
                    } else {
                        (vec![flags], Vec::new())
                    }
                }
                Effect::Untracked => (Vec::new(), Vec::new()),
            };

        inst.tainted = false;
        inst.symbolized = false;
        inst.expressions.clear();

        if self.taint_enabled {
            let tainted = sources.iter().any(|loc| self.is_tainted_at(loc));
            for dest in dests.iter() {
                self.set_taint(dest, tainted);
            }
            inst.tainted = tainted;
        }

        if self.symbolic_enabled {
            let parents: Vec<SymbolicId> = sources
                .iter()
                .filter_map(|loc| self.symbolic_at(loc))
                .collect();
            if parents.is_empty() {
                for dest in dests.iter() {
                    self.set_symbolic(dest, None);
                }
            } else {
                inst.symbolized = true;
                let refs: Vec<String> = parents.iter().map(|id| format!("#{}", id)).collect();
                for dest in dests.iter() {
                    let id = self.new_expression(format!(
                        "{} := {} ({})",
                        dest,
                        inst.disassembly,
                        refs.join(", ")
                    ));
                    self.set_symbolic(dest, Some(id));
                    inst.expressions.push(id);
                }
            }
        }

        if inst.branch {
            inst.condition_taken = condition_taken(decoded.opcode(), regs);
            if inst.symbolized {
                let next = inst.next_address;
                let target = inst.branch_target.unwrap_or(next);
                let id = self.new_expression(format!(
                    "{} := ite({}, 0x{:x}, 0x{:x})",
                    PC, inst.disassembly, target, next
                ));
                self.symbolic_regs.insert(PC.to_string(), id);
                inst.expressions.push(id);
            }
        }

        Ok(())
    }

    fn symbolic_register_id(&self, reg: Register) -> Option<SymbolicId> {
        let name = match reg {
            Register::ProgramCounter => PC.to_string(),
            Register::Flags => FLAGS.to_string(),
            Register::Named(name) => canonical(name),
        };
        self.symbolic_regs.get(&name).copied()
    }

    fn symbolic_expressions(&self, inst: &Instruction) -> Vec<String> {
        inst.expressions
            .iter()
            .filter_map(|id| self.expressions.get(*id).cloned())
            .collect()
    }

    fn reset(&mut self) {
        self.tainted_regs.clear();
        self.tainted_mem.clear();
        self.symbolic_regs.clear();
        self.symbolic_mem.clear();
        self.expressions.clear();
        self.variables = 0;
    }

    fn enable_taint(&mut self, enabled: bool) {
        self.taint_enabled = enabled;
    }

    fn enable_symbolic(&mut self, enabled: bool) {
        self.symbolic_enabled = enabled;
    }

    fn is_taint_enabled(&self) -> bool {
        self.taint_enabled
    }

    fn is_symbolic_enabled(&self) -> bool {
        self.symbolic_enabled
    }

    fn taint_register(&mut self, name: &str) -> Result<(), EngineError> {
        let alias = registers::lookup(name)
            .ok_or_else(|| EngineError::UnknownRegister(name.to_string()))?;
        let location = Location::Register(alias.parent.to_string());
        if self.taint_enabled {
            self.set_taint(&location, true);
        }
        if self.symbolic_enabled {
            let id = self.new_variable(alias.parent);
            self.set_symbolic(&location, Some(id));
        }
        Ok(())
    }

    fn taint_memory(&mut self, address: u64, len: u64) {
        for i in 0..len {
            let byte = address.wrapping_add(i);
            let location = Location::Memory(byte, 1);
            if self.taint_enabled {
                self.set_taint(&location, true);
            }
            if self.symbolic_enabled {
                let id = self.new_variable(&format!("0x{:x}", byte));
                self.set_symbolic(&location, Some(id));
            }
        }
    }

    fn is_register_tainted(&self, name: &str) -> bool {
        self.tainted_regs.contains(&canonical(name))
    }

    fn is_memory_tainted(&self, address: u64) -> bool {
        self.tainted_mem.contains(&address)
    }
}
