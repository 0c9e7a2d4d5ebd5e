//! Drive the dispatcher from a recorded list of debugger events.

pub mod host;
pub mod image;

pub use host::{ReplayHost, Request};
pub use image::{Function, MemoryImage, Segment};

use indicatif::ProgressBar;
use log::{info, warn};
use serde_derive::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::read;
use std::path::Path;

use crate::constraints::PathConstraints;
use crate::dispatcher::{DebugEvent, Dispatcher};
use crate::engine::{Engine, ShadowEngine};
use crate::error::ReplayError;
use crate::host::{Answer, Color, Debugger};
use crate::instruction::{Instruction, ThreadId};
use crate::options::Options;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    ProcessStart,
    ProcessExit,
    StepInto {
        #[serde(default)]
        tid: ThreadId,
        pc: u64,
    },
    StepOver {
        #[serde(default)]
        tid: ThreadId,
        pc: u64,
    },
    Trace {
        #[serde(default)]
        tid: ThreadId,
        pc: u64,
    },
    Breakpoint {
        #[serde(default)]
        tid: ThreadId,
        pc: u64,
    },
    Registers {
        values: HashMap<String, u64>,
    },
    Write {
        address: u64,
        bytes: Vec<u8>,
    },
    Function {
        start: u64,
        end: u64,
        name: String,
    },
    SetBreakpoint {
        address: u64,
    },
    /// Taint `register` once execution reaches `address`.
    BreakAndTaint {
        address: u64,
        register: String,
    },
    TaintRegister {
        register: String,
    },
    TaintMemory {
        address: u64,
        len: u64,
    },
    Answer {
        yes: bool,
    },
    EnableStepTrace,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    #[serde(default)]
    pub options: Option<Options>,
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ReplayError> {
        let data = read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

#[derive(Serialize, Debug)]
pub struct Report {
    pub constraints: PathConstraints,
    pub colors: BTreeMap<u64, Color>,
    pub comments: BTreeMap<u64, Vec<String>>,
    pub renamed: BTreeMap<u64, String>,
    pub requests: Vec<Request>,
    pub questions: Vec<String>,
    pub total_traced: u64,
    pub something_tainted_or_symbolized: bool,
    pub last_instruction: Option<Instruction>,
}

impl Report {
    fn new<E: Engine>(dispatcher: &Dispatcher<E>, host: ReplayHost) -> Self {
        let state = dispatcher.state();
        Self {
            constraints: state.constraints.clone(),
            colors: host.colors,
            comments: host.comments,
            renamed: host.renames,
            requests: host.requests,
            questions: host.questions,
            total_traced: state.total_traced,
            something_tainted_or_symbolized: state.something_tainted_or_symbolized,
            last_instruction: state.last_instruction.clone(),
        }
    }
}

fn event(step: &Step) -> Option<DebugEvent> {
    match *step {
        Step::ProcessStart => Some(DebugEvent::ProcessStart),
        Step::ProcessExit => Some(DebugEvent::ProcessExit),
        Step::StepInto { tid, pc } => Some(DebugEvent::StepInto { tid, pc }),
        Step::StepOver { tid, pc } => Some(DebugEvent::StepOver { tid, pc }),
        Step::Trace { tid, pc } => Some(DebugEvent::Trace { tid, pc }),
        Step::Breakpoint { tid, pc } => Some(DebugEvent::Breakpoint { tid, pc }),
        _ => None,
    }
}

fn apply<E: Engine>(dispatcher: &mut Dispatcher<E>, host: &mut ReplayHost, step: &Step) {
    if let Some(event) = event(step) {
        match event {
            DebugEvent::StepInto { tid, pc }
            | DebugEvent::StepOver { tid, pc }
            | DebugEvent::Trace { tid, pc }
            | DebugEvent::Breakpoint { tid, pc } => host.stop_at(tid, pc),
            DebugEvent::ProcessStart | DebugEvent::ProcessExit => {}
        }
        dispatcher.handle(host, event);
        return;
    }

    match step {
        Step::Registers { values } => {
            for (name, value) in values {
                host.set_register(name, *value);
            }
        }
        Step::Write { address, bytes } => {
            if host.image_mut().write(*address, bytes) != bytes.len() {
                warn!("[!] Write at 0x{:x} is not fully mapped", address);
            }
        }
        Step::Function { start, end, name } => host.image_mut().add_function(*start, *end, name),
        Step::SetBreakpoint { address } => {
            host.add_breakpoint(*address);
        }
        Step::BreakAndTaint { address, register } => {
            let register = register.clone();
            dispatcher.break_and_run(host, *address, move |pc, ctx| {
                match ctx.engine.taint_register(&register) {
                    Ok(()) => {
                        info!("[+] Tainting {} at 0x{:x}", register, pc);
                        ctx.arm();
                    }
                    Err(err) => warn!("[!] {}", err),
                }
            });
        }
        Step::TaintRegister { register } => {
            if let Err(err) = dispatcher.taint_register(host, register) {
                warn!("[!] {}", err);
            }
        }
        Step::TaintMemory { address, len } => {
            dispatcher.taint_memory(host, *address, *len);
        }
        Step::Answer { yes } => host.push_answer(if *yes { Answer::Yes } else { Answer::No }),
        Step::EnableStepTrace => dispatcher.enable_step_trace(host),
        _ => {}
    }
}

/// Replay `script` against `image` with the shadow engine.
pub fn replay(script: &Script, image: MemoryImage, options: Options, progress: bool) -> Report {
    let options = script.options.clone().unwrap_or(options);
    let mut dispatcher = Dispatcher::new(options, ShadowEngine::new());
    let mut host = ReplayHost::new(image);

    let bar = if progress {
        ProgressBar::new(script.steps.len() as u64)
    } else {
        ProgressBar::hidden()
    };

    for step in script.steps.iter() {
        apply(&mut dispatcher, &mut host, step);
        bar.inc(1);
    }
    bar.finish();

    info!(
        "Traced {} instructions, {} path constraints",
        dispatcher.state().total_traced,
        dispatcher.state().constraints.len()
    );
    Report::new(&dispatcher, host)
}
