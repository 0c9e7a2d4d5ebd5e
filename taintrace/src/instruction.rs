use serde_derive::Serialize;
use std::fmt::{Display, Formatter, Result as DisplayResult};

/// Longest encoding the tracer will ever fetch for one instruction.
pub const MAX_INSTRUCTION_LEN: usize = 15;

pub type ThreadId = u64;
pub type SymbolicId = usize;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperandKind {
    Register(String),
    Immediate(u64),
    /// `address` is the effective address when the engine could resolve it
    Memory { address: Option<u64>, size: u8 },
}

impl Display for OperandKind {
    fn fmt(&self, f: &mut Formatter) -> DisplayResult {
        match self {
            OperandKind::Register(name) => write!(f, "{}", name),
            OperandKind::Immediate(value) => write!(f, "0x{:x}", value),
            OperandKind::Memory {
                address: Some(address),
                size,
            } => write!(f, "[0x{:x}]:{}", address, size),
            OperandKind::Memory { address: None, size } => write!(f, "[?]:{}", size),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    pub kind: OperandKind,
    pub tainted: bool,
    pub trusted: bool,
}

impl Operand {
    pub fn new(kind: OperandKind) -> Self {
        Self {
            kind,
            tainted: false,
            trusted: false,
        }
    }
}

/// One traced instruction. Built by the decoder adapter, filled in by the engine.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Instruction {
    pub address: u64,
    pub thread_id: ThreadId,
    pub opcode: Vec<u8>,
    pub disassembly: String,
    pub operands: Vec<Operand>,
    /// Fall-through address, `address + opcode.len()` once decoded.
    pub next_address: u64,
    /// Immediate target of a conditional branch.
    pub branch_target: Option<u64>,
    pub tainted: bool,
    pub symbolized: bool,
    /// Set for conditional branches only.
    pub branch: bool,
    pub condition_taken: bool,
    pub expressions: Vec<SymbolicId>,
}

impl Instruction {
    pub fn new(address: u64, thread_id: ThreadId) -> Self {
        Self {
            address,
            thread_id,
            ..Default::default()
        }
    }

    /// Store the opcode bytes, never more than `MAX_INSTRUCTION_LEN` of them.
    pub fn set_opcode(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(MAX_INSTRUCTION_LEN);
        self.opcode = bytes[..len].to_vec();
        self.next_address = self.address.wrapping_add(len as u64);
    }

    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    pub fn is_symbolized(&self) -> bool {
        self.symbolized
    }

    pub fn is_branch(&self) -> bool {
        self.branch
    }

    pub fn is_condition_taken(&self) -> bool {
        self.condition_taken
    }

    /// Operands whose value derives from a taint source.
    pub fn controlled_operands(&self) -> impl Iterator<Item = &Operand> {
        self.operands.iter().filter(|op| op.tainted)
    }

    pub fn trust_operands(&mut self) {
        for op in self.operands.iter_mut() {
            op.trusted = true;
        }
    }

    /// (taken, not taken) successors of a conditional branch, in the order they were realized.
    pub fn successors(&self) -> Option<(u64, u64)> {
        let target = self.branch_target?;
        if self.condition_taken {
            Some((target, self.next_address))
        } else {
            Some((self.next_address, target))
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter) -> DisplayResult {
        write!(
            f,
            "0x{:x}: {} (Thread id: {})",
            self.address, self.disassembly, self.thread_id
        )
    }
}
