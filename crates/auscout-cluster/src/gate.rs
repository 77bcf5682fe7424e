//! Bounded access gate
//!
//! Up to `max` holders may be inside at once. [`AccessGate::drain`] closes
//! the gate to newcomers, waits for the current holders to leave and keeps
//! it closed until the returned guard drops.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct GateState {
    holders: usize,
    draining: bool,
}

#[derive(Debug)]
pub struct AccessGate {
    state: Mutex<GateState>,
    changed: Condvar,
    max: usize,
}

/// Shared admission; leaves the gate on drop
#[must_use]
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a AccessGate,
}

/// Exclusive admission; reopens the gate on drop
#[must_use]
#[derive(Debug)]
pub struct DrainGuard<'a> {
    gate: &'a AccessGate,
}

impl AccessGate {
    pub fn new(max: usize) -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            changed: Condvar::new(),
            max: max.max(1),
        }
    }

    /// Wait for a free slot and take it
    pub fn enter(&self) -> GateGuard<'_> {
        let mut state = self.state.lock();
        while state.draining || state.holders >= self.max {
            self.changed.wait(&mut state);
        }
        state.holders += 1;
        GateGuard { gate: self }
    }

    /// Close the gate and wait until nobody is inside
    pub fn drain(&self) -> DrainGuard<'_> {
        let mut state = self.state.lock();
        while state.draining {
            self.changed.wait(&mut state);
        }
        state.draining = true;
        while state.holders > 0 {
            self.changed.wait(&mut state);
        }
        DrainGuard { gate: self }
    }

    pub fn holders(&self) -> usize {
        self.state.lock().holders
    }

    pub fn capacity(&self) -> usize {
        self.max
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.holders -= 1;
        self.gate.changed.notify_all();
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.draining = false;
        self.gate.changed.notify_all();
    }
}
