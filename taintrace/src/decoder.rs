use yaxpeax_arch::LengthedInstruction;
use yaxpeax_x86::long_mode::InstDecoder;

use crate::error::TraceError;
use crate::host::Debugger;
use crate::instruction::{Instruction, ThreadId, MAX_INSTRUCTION_LEN};

/// Fetch and size the instruction at `address` into a fresh record.
///
/// The host decides the length; the record keeps exactly that many bytes.
pub fn fetch_instruction(
    host: &dyn Debugger,
    address: u64,
    thread_id: ThreadId,
) -> Result<Instruction, TraceError> {
    let len = match host.instruction_length(address) {
        Some(len) if len > 0 && len <= MAX_INSTRUCTION_LEN => len,
        _ => return Err(TraceError::Decode { address }),
    };

    let mut opcodes = [0u8; MAX_INSTRUCTION_LEN];
    if host.read_memory(address, &mut opcodes) < len {
        return Err(TraceError::Decode { address });
    }

    let mut inst = Instruction::new(address, thread_id);
    inst.set_opcode(&opcodes[..len]);
    Ok(inst)
}

/// x86-64 length decoder for hosts that only hand out raw bytes.
pub struct LengthDecoder {
    decoder: InstDecoder,
}

impl Default for LengthDecoder {
    fn default() -> Self {
        Self {
            decoder: InstDecoder::default(),
        }
    }
}

impl LengthDecoder {
    pub fn length(&self, bytes: &[u8]) -> Option<usize> {
        let instr = self.decoder.decode_slice(bytes).ok()?;
        usize::try_from(instr.len().to_const()).ok()
    }
}
