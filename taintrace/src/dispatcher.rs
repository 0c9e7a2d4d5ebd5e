//! Reacts to debugger notifications.
//!
//! There is no explicit state enum: what happens on each event depends on the
//! runtime trigger, the auto-continue flag and the pending action queue held in
//! `SessionState`.

use std::cell::RefCell;

use log::{debug, info, warn};

use crate::engine::registers::PC;
use crate::engine::Engine;
use crate::error::{EngineError, TraceError};
use crate::host::{Answer, Debugger};
use crate::instruction::ThreadId;
use crate::options::Options;
use crate::pending::HitContext;
use crate::session::SessionState;
use crate::tracer::{TraceOutcome, Tracer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugEvent {
    ProcessStart,
    StepInto { tid: ThreadId, pc: u64 },
    StepOver { tid: ThreadId, pc: u64 },
    /// One instruction executed while step tracing is enabled.
    Trace { tid: ThreadId, pc: u64 },
    Breakpoint { tid: ThreadId, pc: u64 },
    ProcessExit,
}

pub struct Dispatcher<E: Engine> {
    tracer: Tracer<E>,
    state: SessionState,
}

impl<E: Engine> Dispatcher<E> {
    pub fn new(options: Options, engine: E) -> Self {
        Self {
            tracer: Tracer::new(options, engine),
            state: SessionState::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn options(&self) -> &Options {
        self.tracer.options()
    }

    pub fn engine(&self) -> &E {
        self.tracer.engine()
    }

    pub fn engine_mut(&mut self) -> &mut E {
        self.tracer.engine_mut()
    }

    /// Deliver `event` to a shared dispatcher.
    ///
    /// A host that notifies again while an event is still being handled gets
    /// the nested event dropped instead of a second mutable borrow.
    pub fn dispatch<H: Debugger>(cell: &RefCell<Self>, host: &mut H, event: DebugEvent) -> i32 {
        match cell.try_borrow_mut() {
            Ok(mut dispatcher) => dispatcher.handle(host, event),
            Err(_) => {
                warn!("[!] Re-entrant {:?} notification ignored", event);
                0
            }
        }
    }

    /// Handle one notification. Always returns 0.
    pub fn handle<H: Debugger>(&mut self, host: &mut H, event: DebugEvent) -> i32 {
        match event {
            DebugEvent::ProcessStart => self.on_process_start(host),
            DebugEvent::StepInto { tid, pc } => self.on_step(host, tid, pc, true),
            DebugEvent::StepOver { tid, pc } => self.on_step(host, tid, pc, false),
            DebugEvent::Trace { tid, pc } => self.on_trace(host, tid, pc),
            DebugEvent::Breakpoint { tid, pc } => self.on_breakpoint(host, tid, pc),
            DebugEvent::ProcessExit => self.on_process_exit(),
        }
        0
    }

    pub fn restart(&mut self) {
        let (options, engine) = (self.tracer.options().clone(), self.tracer.engine_mut());
        self.state.restart(engine, &options);
    }

    pub fn trace<H: Debugger>(&mut self, host: &mut H, pc: u64, tid: ThreadId) -> TraceOutcome {
        self.tracer.trace(&mut self.state, host, pc, tid)
    }

    /// Queue `callback` for the next time execution reaches `address`.
    pub fn register_pending_action<F>(&mut self, address: u64, callback: F, ignore_breakpoint: bool)
    where
        F: FnMut(u64, &mut HitContext<'_>) + 'static,
    {
        self.state.pending.register(address, callback, ignore_breakpoint);
    }

    /// Break at `address` and run `callback` there.
    ///
    /// If the user already has a breakpoint at `address` it is left alone and
    /// execution stops there as usual after the callback.
    pub fn break_and_run<H, F>(&mut self, host: &mut H, address: u64, callback: F)
    where
        H: Debugger,
        F: FnMut(u64, &mut HitContext<'_>) + 'static,
    {
        let user_breakpoint = host.has_breakpoint(address);
        if !user_breakpoint {
            host.add_breakpoint(address);
        }
        self.state.pending.register(address, callback, user_breakpoint);
    }

    /// Re-trace the instruction at the current program counter.
    pub fn reanalyze_current<H: Debugger>(&mut self, host: &mut H) -> TraceOutcome {
        let pc = match host.register(PC) {
            Some(pc) => pc,
            None => {
                let err = TraceError::Register(PC.to_string());
                warn!("[!] {}", err);
                return TraceOutcome::Abandoned(err);
            }
        };
        if self.options().show_debug_info {
            info!("[+] Reanalyzing instruction at 0x{:x}", pc);
        }
        let tid = host.current_thread();
        self.trace(host, pc, tid)
    }

    /// Make `name` a taint source and start tracing.
    pub fn taint_register<H: Debugger>(
        &mut self,
        host: &mut H,
        name: &str,
    ) -> Result<TraceOutcome, EngineError> {
        self.tracer.engine_mut().taint_register(name)?;
        self.arm();
        Ok(self.reanalyze_current(host))
    }

    pub fn taint_memory<H: Debugger>(
        &mut self,
        host: &mut H,
        address: u64,
        len: u64,
    ) -> TraceOutcome {
        self.tracer.engine_mut().taint_memory(address, len);
        self.arm();
        self.reanalyze_current(host)
    }

    /// Re-open step tracing after the user declined another window.
    pub fn enable_step_trace<H: Debugger>(&mut self, host: &mut H) {
        self.state.step_trace_stopped = false;
        self.state.current_trace_counter = 0;
        host.enable_step_trace();
    }

    fn arm(&mut self) {
        self.state.trigger.enable();
        self.state.something_tainted_or_symbolized = true;
    }

    fn paint<H: Debugger>(&self, host: &mut H, pc: u64) {
        if self.options().paint_executed_instructions {
            host.set_item_color(pc, self.options().color_executed_instruction);
        }
    }

    fn on_process_start<H: Debugger>(&mut self, host: &mut H) {
        if self.options().show_debug_info {
            info!("[+] Starting the debugged process. Resetting all the engines.");
        }
        self.restart();
        host.clear_requests_queue();
    }

    fn on_step<H: Debugger>(&mut self, host: &mut H, tid: ThreadId, pc: u64, into: bool) {
        // a breakpoint we set and the step that reached it arrive as two events
        // for the same instruction; it was already traced on the breakpoint
        let already_traced = match self.state.last_address() {
            Some(last) => last == pc,
            None => true,
        };
        if !already_traced {
            if self.options().show_extra_debug_info {
                debug!(
                    "[+] Stepping {}: 0x{:x} (Tid: {})",
                    if into { "into" } else { "over" },
                    pc,
                    tid
                );
            }
            self.paint(host, pc);
            self.trace(host, pc, tid);
        }

        if !self.state.auto_continue {
            return;
        }

        let pattern = &self.tracer.options().mode_switch_pattern;
        match &self.state.last_instruction {
            Some(inst) if !pattern.is_empty() && inst.disassembly.contains(pattern.as_str()) => {
                info!("[+] Mode switch at 0x{:x}, stepping over", inst.address);
                host.request_step_over();
            }
            Some(_) => host.request_step_into(),
            None => {
                debug!("{}", TraceError::StaleInstruction);
                host.request_step_into();
            }
        }
    }

    fn on_trace<H: Debugger>(&mut self, host: &mut H, tid: ThreadId, pc: u64) {
        if self.state.step_trace_stopped {
            debug!("step tracing stopped, ignoring trace at 0x{:x}", pc);
            return;
        }

        self.paint(host, pc);
        self.trace(host, pc, tid);

        self.state.current_trace_counter += 1;
        self.state.total_traced += 1;

        let limit = match self.options().trace_limit() {
            Some(limit) => limit,
            None => return,
        };
        if self.state.current_trace_counter != limit {
            return;
        }

        let question = format!(
            "[?] {} instructions has been traced. Do you want to execute {} more?",
            self.state.total_traced, limit
        );
        match host.ask_yes_no(&question) {
            Answer::Yes => self.state.current_trace_counter = 0,
            Answer::No | Answer::Cancel => {
                host.disable_step_trace();
                host.suspend_process();
                self.state.step_trace_stopped = true;
                info!(
                    "[!] Process suspended (Traced {} instructions)",
                    self.state.total_traced
                );
            }
        }
    }

    fn on_breakpoint<H: Debugger>(&mut self, host: &mut H, tid: ThreadId, pc: u64) {
        let mut action = match self.state.pending.consume(pc) {
            Some(action) => action,
            None => {
                // a user-defined breakpoint stops automatic stepping
                self.state.auto_continue = false;
                return;
            }
        };

        let armed = {
            let mut ctx = HitContext::new(self.tracer.engine_mut(), host);
            action.fire(pc, &mut ctx);
            ctx.is_armed()
        };
        if armed {
            self.arm();
        }

        self.paint(host, pc);
        self.trace(host, pc, tid);

        if action.ignore_breakpoint {
            self.state.pending.requeue(action);
            self.state.auto_continue = false;
            return;
        }

        host.remove_breakpoint(pc);
        if self.options().step_into_when_tainting {
            self.state.auto_continue = true;
            host.request_step_into();
            host.run_requests();
        } else {
            host.continue_process();
        }
    }

    fn on_process_exit(&mut self) {
        if self.options().show_debug_info {
            info!("[!] Process exiting...");
        }
        self.state.trigger.disable();
    }
}
