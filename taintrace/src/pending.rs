//! Breakpoint pending actions.
//!
//! An action is a callback the tracer wants to run the next time execution
//! reaches an address, typically to taint the arguments of a function once
//! it is entered. Actions are matched in the order they were registered.

use std::collections::VecDeque;
use std::fmt::{Debug, Formatter, Result as DisplayResult};

use crate::engine::Engine;
use crate::host::Debugger;

/// What a pending action callback can touch when its breakpoint is hit.
pub struct HitContext<'a> {
    pub engine: &'a mut dyn Engine,
    pub host: &'a mut dyn Debugger,
    armed: bool,
}

impl<'a> HitContext<'a> {
    pub fn new(engine: &'a mut dyn Engine, host: &'a mut dyn Debugger) -> Self {
        Self {
            engine,
            host,
            armed: false,
        }
    }

    /// Enable the runtime trigger once the callback returns.
    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

pub type Callback = Box<dyn FnMut(u64, &mut HitContext<'_>)>;

pub struct PendingAction {
    pub address: u64,
    pub callback: Callback,
    /// A user breakpoint shares the address: keep it and do not continue.
    pub ignore_breakpoint: bool,
}

impl PendingAction {
    pub fn new(address: u64, callback: Callback, ignore_breakpoint: bool) -> Self {
        Self {
            address,
            callback,
            ignore_breakpoint,
        }
    }

    pub fn fire(&mut self, address: u64, ctx: &mut HitContext<'_>) {
        (self.callback)(address, ctx);
    }
}

impl Debug for PendingAction {
    fn fmt(&self, f: &mut Formatter) -> DisplayResult {
        f.debug_struct("PendingAction")
            .field("address", &format_args!("0x{:x}", self.address))
            .field("ignore_breakpoint", &self.ignore_breakpoint)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct PendingActions {
    actions: VecDeque<PendingAction>,
}

impl PendingActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, address: u64, callback: F, ignore_breakpoint: bool)
    where
        F: FnMut(u64, &mut HitContext<'_>) + 'static,
    {
        self.actions
            .push_back(PendingAction::new(address, Box::new(callback), ignore_breakpoint));
    }

    /// Remove and return the first action registered for `address`.
    pub fn consume(&mut self, address: u64) -> Option<PendingAction> {
        let index = self.actions.iter().position(|a| a.address == address)?;
        self.actions.remove(index)
    }

    /// Put back an action that respects a user breakpoint, ahead of everything else
    /// so it keeps winning for its address.
    pub fn requeue(&mut self, action: PendingAction) {
        self.actions.push_front(action);
    }

    pub fn contains(&self, address: u64) -> bool {
        self.actions.iter().any(|a| a.address == address)
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_matches_in_insertion_order() {
        let mut actions = PendingActions::new();
        actions.register(0x2000, |_, _| {}, false);
        actions.register(0x1000, |_, _| {}, true);
        actions.register(0x1000, |_, _| {}, false);

        let first = actions.consume(0x1000).unwrap();
        assert!(first.ignore_breakpoint);
        let second = actions.consume(0x1000).unwrap();
        assert!(!second.ignore_breakpoint);
        assert!(actions.consume(0x1000).is_none());
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn requeued_action_keeps_priority() {
        let mut actions = PendingActions::new();
        actions.register(0x1000, |_, _| {}, true);
        actions.register(0x1000, |_, _| {}, false);

        let first = actions.consume(0x1000).unwrap();
        actions.requeue(first);
        assert!(actions.consume(0x1000).unwrap().ignore_breakpoint);
    }
}
