#![no_std]

#[cfg(test)]
extern crate std;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod clock;
mod codec;
mod config;
mod driver;
mod frame;
mod mailbox;
mod regs;
mod shared;
#[cfg(test)]
mod sim;
mod wait;

/// Elements in the receive FIFO filter table (`CTRL2.RFFN = 0`).
pub const FILTER_ELEMENTS: usize = 8;

pub use config::*;
pub use driver::*;
pub use frame::*;
pub use mailbox::{Code, TX_MAILBOX};
pub use regs::{Instance, Mmio, Port, Reg, Registers};
pub use shared::*;
pub use wait::*;

pub use embedded_can::{Id, StandardId};
