use log::debug;
use serde_derive::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::decoder::LengthDecoder;
use crate::engine::registers::{canonical, PC};
use crate::host::{Answer, Color, Debugger, Registers};
use crate::instruction::{ThreadId, MAX_INSTRUCTION_LEN};
use crate::replay::image::MemoryImage;

/// Process-control requests the tracer made, in order.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    StepInto,
    StepOver,
    RunRequests,
    ClearRequests,
    Continue,
    Suspend,
    EnableStepTrace,
    DisableStepTrace,
}

/// A debugger stand-in over a static memory image.
///
/// Registers and the current thread are whatever the replay script last set;
/// everything the tracer asks the debugger to do is recorded instead of done.
pub struct ReplayHost {
    image: MemoryImage,
    lengths: LengthDecoder,
    registers: HashMap<String, u64>,
    thread: ThreadId,
    breakpoints: BTreeSet<u64>,
    answers: VecDeque<Answer>,
    step_trace: bool,
    pub colors: BTreeMap<u64, Color>,
    pub comments: BTreeMap<u64, Vec<String>>,
    /// New names, keyed by function start.
    pub renames: BTreeMap<u64, String>,
    pub requests: Vec<Request>,
    pub questions: Vec<String>,
}

impl ReplayHost {
    pub fn new(image: MemoryImage) -> Self {
        Self {
            image,
            lengths: LengthDecoder::default(),
            registers: HashMap::new(),
            thread: 0,
            breakpoints: BTreeSet::new(),
            answers: VecDeque::new(),
            step_trace: false,
            colors: BTreeMap::new(),
            comments: BTreeMap::new(),
            renames: BTreeMap::new(),
            requests: Vec::new(),
            questions: Vec::new(),
        }
    }

    pub fn image(&self) -> &MemoryImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut MemoryImage {
        &mut self.image
    }

    pub fn set_register(&mut self, name: &str, value: u64) {
        self.registers.insert(canonical(name), value);
    }

    /// Move the debuggee to `pc` on thread `tid`, as a stop event would.
    pub fn stop_at(&mut self, tid: ThreadId, pc: u64) {
        self.thread = tid;
        self.set_register(PC, pc);
    }

    /// Queue the answer to the next yes/no prompt. Unanswered prompts get `Yes`.
    pub fn push_answer(&mut self, answer: Answer) {
        self.answers.push_back(answer);
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = &u64> {
        self.breakpoints.iter()
    }

    pub fn is_step_tracing(&self) -> bool {
        self.step_trace
    }
}

impl Registers for ReplayHost {
    fn register(&self, name: &str) -> Option<u64> {
        self.registers.get(&canonical(name)).copied()
    }
}

impl Debugger for ReplayHost {
    fn read_memory(&self, address: u64, buf: &mut [u8]) -> usize {
        self.image.read(address, buf)
    }

    fn instruction_length(&self, address: u64) -> Option<usize> {
        let mut buf = [0u8; MAX_INSTRUCTION_LEN];
        let n = self.image.read(address, &mut buf);
        if n == 0 {
            return None;
        }
        self.lengths.length(&buf[..n])
    }

    fn current_thread(&self) -> ThreadId {
        self.thread
    }

    fn has_breakpoint(&self, address: u64) -> bool {
        self.breakpoints.contains(&address)
    }

    fn add_breakpoint(&mut self, address: u64) -> bool {
        self.breakpoints.insert(address)
    }

    fn remove_breakpoint(&mut self, address: u64) -> bool {
        self.breakpoints.remove(&address)
    }

    fn request_step_into(&mut self) {
        self.requests.push(Request::StepInto);
    }

    fn request_step_over(&mut self) {
        self.requests.push(Request::StepOver);
    }

    fn run_requests(&mut self) {
        self.requests.push(Request::RunRequests);
    }

    fn clear_requests_queue(&mut self) {
        self.requests.push(Request::ClearRequests);
    }

    fn continue_process(&mut self) {
        self.requests.push(Request::Continue);
    }

    fn suspend_process(&mut self) {
        self.requests.push(Request::Suspend);
    }

    fn enable_step_trace(&mut self) {
        self.step_trace = true;
        self.requests.push(Request::EnableStepTrace);
    }

    fn disable_step_trace(&mut self) {
        self.step_trace = false;
        self.requests.push(Request::DisableStepTrace);
    }

    fn ask_yes_no(&mut self, question: &str) -> Answer {
        debug!("{}", question);
        self.questions.push(question.to_string());
        self.answers.pop_front().unwrap_or(Answer::Yes)
    }

    fn set_item_color(&mut self, address: u64, color: Color) {
        self.colors.insert(address, color);
    }

    fn add_comment(&mut self, address: u64, text: &str) {
        self.comments
            .entry(address)
            .or_insert_with(Vec::new)
            .push(text.to_string());
    }

    fn function_name(&self, address: u64) -> Option<String> {
        let function = self.image.function_at(address)?;
        Some(
            self.renames
                .get(&function.start)
                .cloned()
                .unwrap_or_else(|| function.name.clone()),
        )
    }

    fn rename_function(&mut self, address: u64, name: &str) -> bool {
        let start = match self.image.function_at(address) {
            Some(function) => function.start,
            None => return false,
        };
        self.renames.insert(start, name.to_string());
        true
    }
}
