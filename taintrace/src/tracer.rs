use log::{debug, info, warn};

use crate::constraints::PathConstraint;
use crate::decoder::fetch_instruction;
use crate::engine::{Engine, Register};
use crate::error::{Opcodes, TraceError};
use crate::host::Debugger;
use crate::instruction::{Instruction, ThreadId};
use crate::options::Options;
use crate::session::SessionState;

#[derive(Debug)]
pub enum TraceOutcome {
    /// The runtime trigger is off; nothing happened.
    Dormant,
    /// This instruction could not be traced; the session carries on.
    Abandoned(TraceError),
    Traced {
        tainted: bool,
        symbolized: bool,
        constraint: Option<PathConstraint>,
    },
}

impl TraceOutcome {
    pub fn is_traced(&self) -> bool {
        matches!(self, TraceOutcome::Traced { .. })
    }
}

/// Prefix given to functions that execute tainted instructions: `T000_main`
pub fn tainted_function_name(index: u32, name: &str) -> String {
    format!("T{:03}_{}", index, name)
}

pub fn is_tainted_function_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() > 5
        && bytes[0] == b'T'
        && bytes[1..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'_'
}

pub struct Tracer<E: Engine> {
    options: Options,
    engine: E,
}

impl<E: Engine> Tracer<E> {
    pub fn new(options: Options, engine: E) -> Self {
        Self { options, engine }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Decode, evaluate and record the instruction at `address`.
    pub fn trace<H: Debugger>(
        &mut self,
        state: &mut SessionState,
        host: &mut H,
        address: u64,
        thread_id: ThreadId,
    ) -> TraceOutcome {
        if !state.trigger.is_enabled() {
            return TraceOutcome::Dormant;
        }

        // the previous record is gone even if this one fails to decode
        state.last_instruction = Some(Instruction::new(address, thread_id));

        let mut inst = match fetch_instruction(&*host, address, thread_id) {
            Ok(inst) => inst,
            Err(err) => {
                warn!("[!] {}", err);
                return TraceOutcome::Abandoned(err);
            }
        };

        if let Err(source) = self.engine.disassemble(&mut inst) {
            let err = TraceError::Disassembly {
                address,
                opcodes: Opcodes(inst.opcode.clone()),
                source,
            };
            warn!("[!] {}", err);
            state.last_instruction = Some(inst);
            return TraceOutcome::Abandoned(err);
        }

        if self.options.show_debug_info {
            info!("[+] Tracing {}", inst);
        }

        if let Err(source) = self.engine.build_semantics(&mut inst, &*host) {
            let err = TraceError::Semantics {
                address,
                opcodes: Opcodes(inst.opcode.clone()),
                source,
            };
            warn!("[!] {}", err);
            state.last_instruction = Some(inst);
            return TraceOutcome::Abandoned(err);
        }

        if self.options.add_comments_controlled_operands {
            self.comment_controlled_operands(host, &inst);
        }
        if self.options.add_comments_symbolic_expressions {
            self.comment_symbolic_expressions(host, &inst);
        }

        inst.trust_operands();

        if inst.is_tainted() || inst.is_symbolized() {
            state.something_tainted_or_symbolized = true;
            if self.options.show_debug_info {
                info!(
                    "[!] Instruction {} at 0x{:x}",
                    if inst.is_tainted() { "tainted" } else { "symbolized" },
                    address
                );
            }
            if self.options.rename_tainted_function_names {
                self.rename_tainted_function(state, host, address);
            }
            if inst.is_branch() {
                host.set_item_color(address, self.options.color_tainted_condition);
            } else {
                host.set_item_color(address, self.options.color_tainted);
            }
        }

        let constraint = if inst.is_branch() && inst.is_symbolized() {
            self.record_branch(state, &inst)
        } else {
            None
        };

        let outcome = TraceOutcome::Traced {
            tainted: inst.is_tainted(),
            symbolized: inst.is_symbolized(),
            constraint,
        };
        state.last_instruction = Some(inst);
        outcome
    }

    fn record_branch(
        &self,
        state: &mut SessionState,
        inst: &Instruction,
    ) -> Option<PathConstraint> {
        let (taken, not_taken) = match inst.successors() {
            Some(successors) => successors,
            None => {
                warn!(
                    "[!] Branch at 0x{:x} has no immediate target, no constraint recorded",
                    inst.address
                );
                return None;
            }
        };

        if self.options.show_debug_info {
            info!(
                "[+] Branch symbolized detected at 0x{:x}: 0x{:x} or 0x{:x}, Taken:{}",
                inst.address,
                inst.next_address,
                inst.branch_target.unwrap_or(inst.next_address),
                if inst.is_condition_taken() { "Yes" } else { "No" }
            );
        }

        let pc_id = match self.engine.symbolic_register_id(Register::ProgramCounter) {
            Some(id) => id,
            None => {
                debug!("no symbolic expression for the program counter, using #0");
                0
            }
        };

        let constraint = PathConstraint::new(pc_id, inst.address, taken, not_taken);
        state.constraints.push(constraint);
        Some(constraint)
    }

    fn comment_controlled_operands<H: Debugger>(&self, host: &mut H, inst: &Instruction) {
        let controlled: Vec<String> = inst
            .controlled_operands()
            .map(|op| op.kind.to_string())
            .collect();
        if !controlled.is_empty() {
            host.add_comment(
                inst.address,
                &format!("Controlled operands: {}", controlled.join(", ")),
            );
        }
    }

    fn comment_symbolic_expressions<H: Debugger>(&self, host: &mut H, inst: &Instruction) {
        let expressions = self.engine.symbolic_expressions(inst);
        if !expressions.is_empty() {
            host.add_comment(inst.address, &expressions.join("\n"));
        }
    }

    fn rename_tainted_function<H: Debugger>(
        &self,
        state: &mut SessionState,
        host: &mut H,
        address: u64,
    ) {
        let name = match host.function_name(address) {
            Some(name) => name,
            None => return,
        };
        if is_tainted_function_name(&name) {
            return;
        }

        let renamed = tainted_function_name(state.tainted_functions_index, &name);
        if host.rename_function(address, &renamed) {
            if self.options.show_extra_debug_info {
                debug!("[+] Renamed {} to {}", name, renamed);
            }
            state.tainted_functions_index += 1;
        }
    }
}
