use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::RawMutex, Mutex};

use crate::{Error, FlexCan, Frame, Registers};

/// A [`FlexCan`] that can be used from several execution contexts, e.g. the
/// main loop and an interrupt handler.
///
/// `M` picks the locking strategy, `CriticalSectionRawMutex` for sharing with
/// interrupts, `NoopRawMutex` when everything runs in one context.
pub struct SharedFlexCan<M: RawMutex, R: Registers> {
    inner: Mutex<M, RefCell<FlexCan<R>>>,
}

impl<M: RawMutex, R: Registers> SharedFlexCan<M, R> {
    pub fn new(can: FlexCan<R>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(can)),
        }
    }

    /// Runs `f` with exclusive access to the driver.
    ///
    /// # Panics
    ///
    /// Panics if `f` locks the same `SharedFlexCan` again.
    pub fn lock<U>(&self, f: impl FnOnce(&mut FlexCan<R>) -> U) -> U {
        self.inner.lock(|can| f(&mut *can.borrow_mut()))
    }

    pub fn install_identifier(&self, id: u32) -> Result<(), Error> {
        self.lock(|can| can.install_identifier(id))
    }

    pub fn transmit(&self, frame: &Frame) -> Result<(), Error> {
        self.lock(|can| can.transmit(frame))
    }

    pub fn receive(&self) -> Result<Frame, Error> {
        self.lock(|can| can.receive())
    }

    pub fn into_inner(self) -> FlexCan<R> {
        self.inner.into_inner().into_inner()
    }
}
