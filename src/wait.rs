use core::num::NonZeroU32;

/// Hardware status the driver polls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Condition {
    /// System oscillator output reported valid (`SOSCVLD`)
    OscillatorValid,
    /// Module disabled, low-power mode acknowledged (`LPMACK` set)
    ModuleDisabled,
    /// Freeze mode acknowledged (`FRZACK` set)
    FreezeEntered,
    /// Freeze mode left (`FRZACK` cleared)
    FreezeExited,
    /// Module synchronized to the bus (`NOTRDY` cleared)
    ModuleReady,
    /// Transmit mailbox flag raised
    TransmitComplete,
    /// Transmit mailbox no longer holds a pending frame
    MailboxReleased,
    /// Receive FIFO holds a frame
    FrameAvailable,
}

/// How long the driver keeps polling a status bit.
///
/// The controller gives no guarantee that a requested transition ever
/// completes (a missing crystal never validates, a dead bus never acknowledges
/// a frame). `Forever` hangs in that case, `Bounded` gives up after the given
/// number of polls and reports the condition as a hardware fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitPolicy {
    #[default]
    Forever,
    Bounded(NonZeroU32),
}

/// A polled condition did not become true within the [`WaitPolicy`] budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("Gave up waiting for {0:?}")]
pub struct Timeout(pub Condition);

impl WaitPolicy {
    /// Polls `done` until it returns true.
    pub fn wait_until<F>(self, condition: Condition, mut done: F) -> Result<(), Timeout>
    where
        F: FnMut() -> bool,
    {
        match self {
            WaitPolicy::Forever => {
                while !done() {
                    core::hint::spin_loop();
                }

                Ok(())
            }
            WaitPolicy::Bounded(polls) => {
                for _ in 0..polls.get() {
                    if done() {
                        return Ok(());
                    }

                    core::hint::spin_loop();
                }

                warn!("gave up waiting for {:?} after {} polls", condition, polls.get());

                Err(Timeout(condition))
            }
        }
    }
}
