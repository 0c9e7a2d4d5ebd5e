#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use taintrace::error::Opcodes;
use taintrace::replay::{MemoryImage, ReplayHost};
use taintrace::{
    Engine, EngineError, Instruction, Operand, OperandKind, Options, Register, Registers,
    SymbolicId,
};

pub const CODE_BASE: u64 = 0x1000;

/// ```text
/// 0x1000  mov rax, rdi
/// 0x1003  cmp rax, 5
/// 0x1007  jz 0x100e
/// 0x1009  xor rax, rax
/// 0x100c  jmp 0x1011
/// 0x100e  inc rax
/// 0x1011  ret
/// ```
pub const CODE: &[u8] = &[
    0x48, 0x89, 0xf8, //
    0x48, 0x83, 0xf8, 0x05, //
    0x74, 0x05, //
    0x48, 0x31, 0xc0, //
    0xeb, 0x03, //
    0x48, 0xff, 0xc0, //
    0xc3,
];

pub const MOV: u64 = 0x1000;
pub const CMP: u64 = 0x1003;
pub const JZ: u64 = 0x1007;
pub const XOR: u64 = 0x1009;
pub const INC: u64 = 0x100e;

pub const ZF: u64 = 1 << 6;

pub fn code_host() -> ReplayHost {
    let mut image = MemoryImage::flat(CODE_BASE, CODE.to_vec()).unwrap();
    image.add_function(CODE_BASE, CODE_BASE + CODE.len() as u64, "check");
    ReplayHost::new(image)
}

/// 64K of `nop` at 0x1000, every address decodes to a one byte instruction.
pub fn nop_host() -> ReplayHost {
    ReplayHost::new(MemoryImage::flat(0x1000, vec![0x90; 0x10000]).unwrap())
}

pub fn quiet_options() -> Options {
    Options {
        show_debug_info: false,
        add_comments_controlled_operands: false,
        rename_tainted_function_names: false,
        limit_instructions_tracing_mode: None,
        ..Options::default()
    }
}

/// What the scripted engine reports for one address.
#[derive(Debug, Clone, Default)]
pub struct Semantics {
    pub tainted: bool,
    pub symbolized: bool,
    pub branch: bool,
    pub taken: bool,
    pub target: Option<u64>,
    pub disassembly: Option<String>,
}

impl Semantics {
    pub fn tainted() -> Self {
        Self {
            tainted: true,
            ..Default::default()
        }
    }

    pub fn symbolic_branch(target: u64, taken: bool) -> Self {
        Self {
            tainted: true,
            symbolized: true,
            branch: true,
            taken,
            target: Some(target),
            disassembly: None,
        }
    }
}

/// Engine whose answers are fixed per address, recording every call.
#[derive(Default)]
pub struct ScriptedEngine {
    pub semantics: HashMap<u64, Semantics>,
    pub fail_disassembly: HashSet<u64>,
    pub fail_semantics: HashSet<u64>,
    pub built: Vec<u64>,
    pub resets: usize,
    pub taint_enabled: bool,
    pub symbolic_enabled: bool,
    pub tainted_registers: Vec<String>,
    pub tainted_memory: Vec<(u64, u64)>,
    pc_id: Option<SymbolicId>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: u64, semantics: Semantics) -> Self {
        self.semantics.insert(address, semantics);
        self
    }
}

impl Engine for ScriptedEngine {
    fn disassemble(&mut self, inst: &mut Instruction) -> Result<(), EngineError> {
        if self.fail_disassembly.contains(&inst.address) {
            return Err(EngineError::InvalidOpcode(Opcodes(inst.opcode.clone())));
        }
        let semantics = self
            .semantics
            .get(&inst.address)
            .cloned()
            .unwrap_or_default();
        inst.disassembly = semantics
            .disassembly
            .unwrap_or_else(|| format!("insn_{:x}", inst.address));
        inst.branch = semantics.branch;
        inst.branch_target = semantics.target;
        inst.operands = vec![Operand::new(OperandKind::Register("rax".to_string()))];
        Ok(())
    }

    fn build_semantics(
        &mut self,
        inst: &mut Instruction,
        _regs: &dyn Registers,
    ) -> Result<(), EngineError> {
        if self.fail_semantics.contains(&inst.address) {
            return Err(EngineError::InvalidOpcode(Opcodes(inst.opcode.clone())));
        }
        self.built.push(inst.address);
        let semantics = self
            .semantics
            .get(&inst.address)
            .cloned()
            .unwrap_or_default();
        inst.tainted = semantics.tainted;
        inst.symbolized = semantics.symbolized;
        inst.condition_taken = semantics.taken;
        for op in inst.operands.iter_mut() {
            op.tainted = semantics.tainted;
        }
        if semantics.branch && semantics.symbolized {
            self.pc_id = Some(self.built.len());
        }
        Ok(())
    }

    fn symbolic_register_id(&self, reg: Register) -> Option<SymbolicId> {
        match reg {
            Register::ProgramCounter => self.pc_id,
            _ => None,
        }
    }

    fn symbolic_expressions(&self, inst: &Instruction) -> Vec<String> {
        if inst.symbolized {
            vec![format!("expr at 0x{:x}", inst.address)]
        } else {
            Vec::new()
        }
    }

    fn reset(&mut self) {
        self.resets += 1;
        self.pc_id = None;
        self.tainted_registers.clear();
        self.tainted_memory.clear();
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
        if name == "bogus" {
            return Err(EngineError::UnknownRegister(name.to_string()));
        }
        self.tainted_registers.push(name.to_string());
        Ok(())
    }

    fn taint_memory(&mut self, address: u64, len: u64) {
        self.tainted_memory.push((address, len));
    }

    fn is_register_tainted(&self, name: &str) -> bool {
        self.tainted_registers.iter().any(|r| r == name)
    }

    fn is_memory_tainted(&self, address: u64) -> bool {
        self.tainted_memory
            .iter()
            .any(|(start, len)| address >= *start && address < start + len)
    }
}
