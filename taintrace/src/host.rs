//! The debugger the tracer is plugged into.
//!
//! Everything here is implemented by the host: process control, breakpoints,
//! memory access and the few UI primitives the tracer needs to report what it
//! found. Requests (`request_step_into`, ...) are queued by the host and run
//! after the current notification returns, unless `run_requests` is called.

use crate::instruction::ThreadId;

/// Background colour, `0xBBGGRR`.
pub type Color = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Cancel,
}

/// Read access to the register file of the thread being debugged.
pub trait Registers {
    /// Look a register up by its lowercase name (`rax`, `rflags`, `rip`, ...)
    fn register(&self, name: &str) -> Option<u64>;
}

pub trait Debugger: Registers {
    /// Copy memory at `address` into `buf`, returning how many bytes were readable.
    fn read_memory(&self, address: u64, buf: &mut [u8]) -> usize;

    /// Length of the instruction at `address` as decoded by the host.
    fn instruction_length(&self, address: u64) -> Option<usize>;

    fn current_thread(&self) -> ThreadId;

    fn has_breakpoint(&self, address: u64) -> bool;
    fn add_breakpoint(&mut self, address: u64) -> bool;
    fn remove_breakpoint(&mut self, address: u64) -> bool;

    fn request_step_into(&mut self);
    fn request_step_over(&mut self);
    fn run_requests(&mut self);
    fn clear_requests_queue(&mut self);
    fn continue_process(&mut self);
    fn suspend_process(&mut self);
    fn enable_step_trace(&mut self);
    fn disable_step_trace(&mut self);

    fn ask_yes_no(&mut self, question: &str) -> Answer;

    fn set_item_color(&mut self, address: u64, color: Color);
    fn add_comment(&mut self, address: u64, text: &str);

    /// Name of the function containing `address`.
    fn function_name(&self, address: u64) -> Option<String>;
    fn rename_function(&mut self, address: u64, name: &str) -> bool;
}
