use std::fmt::{Display, Formatter, Result as DisplayResult};

/// Raw opcode bytes, printed the way the tracer reports them: `48 89 f8`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opcodes(pub Vec<u8>);

impl Display for Opcodes {
    fn fmt(&self, f: &mut Formatter) -> DisplayResult {
        let hex: Vec<String> = self.0.iter().map(|b| format!("{:02x}", b)).collect();
        write!(f, "{}", hex.join(" "))
    }
}

/// Failures while tracing a single instruction. None of these are fatal to the session.
#[derive(thiserror::Error, Debug)]
pub enum TraceError {
    #[error("some error decoding instruction at 0x{address:x}")]
    Decode { address: u64 },

    #[error("disassembling error at 0x{address:x} opcodes: {opcodes}")]
    Disassembly {
        address: u64,
        opcodes: Opcodes,
        #[source]
        source: EngineError,
    },

    #[error("building semantics failed at 0x{address:x} opcodes: {opcodes}")]
    Semantics {
        address: u64,
        opcodes: Opcodes,
        #[source]
        source: EngineError,
    },

    #[error("no instruction has been traced yet")]
    StaleInstruction,

    #[error("register {0} is not available")]
    Register(String),
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("invalid opcode bytes {0}")]
    InvalidOpcode(Opcodes),

    #[error("unknown register {0}")]
    UnknownRegister(String),
}

#[derive(thiserror::Error, Debug)]
pub enum OptionsError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ReplayError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Object(#[from] object::read::Error),

    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error("image has no loadable segments")]
    EmptyImage,

    #[error("0x{len:x} bytes at 0x{start:x} wrap the address space")]
    Wrap { start: u64, len: usize },
}
