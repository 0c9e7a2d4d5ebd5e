use log::info;

use crate::constraints::PathConstraints;
use crate::engine::Engine;
use crate::instruction::Instruction;
use crate::options::Options;
use crate::pending::PendingActions;

/// Gate in front of the tracer. Nothing is traced while it is disabled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeTrigger {
    enabled: bool,
}

impl RuntimeTrigger {
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Everything the tracer mutates during one debug session.
#[derive(Debug, Default)]
pub struct SessionState {
    pub trigger: RuntimeTrigger,
    /// Instructions traced since the last instruction-count prompt.
    pub current_trace_counter: u64,
    pub total_traced: u64,
    pub something_tainted_or_symbolized: bool,
    pub auto_continue: bool,
    pub tainted_functions_index: u32,
    /// Set once the user declined another trace window.
    pub step_trace_stopped: bool,
    pub last_instruction: Option<Instruction>,
    pub pending: PendingActions,
    pub constraints: PathConstraints,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the session for a freshly started process.
    ///
    /// Running this any number of times in a row leaves the same state.
    pub fn restart(&mut self, engine: &mut dyn Engine, options: &Options) {
        if options.show_debug_info {
            info!("[+] Restarting engines...");
        }
        engine.reset();
        engine.enable_taint(options.use_tainting_engine);
        engine.enable_symbolic(options.use_symbolic_engine);

        self.trigger.disable();
        self.something_tainted_or_symbolized = false;
        self.tainted_functions_index = 0;
        self.current_trace_counter = 0;
        self.total_traced = 0;
        self.auto_continue = false;
        self.step_trace_stopped = false;
        self.last_instruction = None;
        self.pending.clear();
        self.constraints.clear();
    }

    pub fn last_address(&self) -> Option<u64> {
        self.last_instruction.as_ref().map(|inst| inst.address)
    }
}
