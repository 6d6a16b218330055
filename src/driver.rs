use embedded_can::{ErrorKind, StandardId};

use crate::{
    clock, codec,
    mailbox::{self, word, Code, FIFO_OUTPUT, FILTER_TABLE_WORD, TX_MAILBOX},
    regs::{ctrl1, ctrl2, iflag, mcr, rxfir, RAM_WORDS, RXIMR_COUNT},
    Condition, Config, ConfigError, Frame, Reg, Registers, Timeout, FILTER_ELEMENTS,
    OSCILLATOR_HZ,
};

/// `IFLAG1` bit of the transmit mailbox.
const TX_FLAG: u32 = 1 << TX_MAILBOX;

/// Driver-side view of the controller's operating mode, following the
/// initialization sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Nothing written yet
    Reset,
    /// Module disabled, clock source selectable
    Disabled,
    /// Oscillator selected as clock source, module still disabled
    ClockSelectPending,
    /// Module enabled
    Enabled,
    /// Freeze requested, waiting for the acknowledge
    FreezeRequested,
    /// Frozen, configuration registers writable
    Frozen,
    /// Freeze exit requested, waiting for the module to resynchronize
    FreezeExitRequested,
    /// Taking part in bus traffic
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    #[error("The receive FIFO is empty")]
    NoFrameAvailable,
    #[error("The transmit mailbox still holds an unsent frame")]
    MailboxBusy,
    #[error("The controller never reported {0:?}")]
    HardwareFault(Condition),
    #[error("Identifier ({0:#x}) is out of the standard range (0..=0x7FF)")]
    InvalidIdentifier(u32),
    #[error("No identifiers given")]
    NoIdentifiers,
    #[error("Got ({0:?}) identifiers but only ({1:?}) filter slots")]
    TooManyIdentifiers(usize, u8),
    #[error("Invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl From<Timeout> for Error {
    fn from(Timeout(condition): Timeout) -> Self {
        Error::HardwareFault(condition)
    }
}

impl embedded_can::Error for Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

fn standard_id(id: u32) -> Result<StandardId, Error> {
    u16::try_from(id)
        .ok()
        .and_then(StandardId::new)
        .ok_or(Error::InvalidIdentifier(id))
}

/// Polling driver for one FlexCAN instance.
///
/// Frames go out through a single transmit mailbox and come in through the
/// receive FIFO, filtered by an 8-element identifier table. Every operation
/// busy-waits on hardware status bits as long as the configured
/// [`WaitPolicy`](crate::WaitPolicy) allows.
pub struct FlexCan<R: Registers> {
    regs: R,
    config: Config,
    state: State,
}

impl<R: Registers> FlexCan<R> {
    /// Takes ownership of the registers. Nothing is written until
    /// [`FlexCan::initialize`] is called.
    pub fn new(regs: R, config: Config) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            regs,
            config,
            state: State::Reset,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Direct register access. Writes through it are not tracked by the
    /// driver.
    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    /// Releases the registers.
    pub fn free(self) -> R {
        self.regs
    }

    /// Brings the oscillator, the controller and its pins from reset to a
    /// running link at the configured bit timing, then installs
    /// [`Config::accepted_ids`] if any were given.
    pub fn initialize(&mut self) -> Result<(), Error> {
        info!("initializing FlexCAN");

        clock::start_oscillator(&mut self.regs, &self.config)?;
        self.enable_module()?;
        self.enter_freeze()?;
        self.configure();
        self.exit_freeze()?;
        clock::route_pins(&mut self.regs, &self.config.pins);

        if !self.config.accepted_ids.is_empty() {
            let ids = self.config.accepted_ids.clone();
            self.install_identifiers(&ids)?;
        }

        info!(
            "FlexCAN running at {} bit/s",
            self.config.bit_timing.bit_rate(OSCILLATOR_HZ)
        );

        Ok(())
    }

    /// Selects the oscillator as clock source and enables the module. A module
    /// left running by earlier code is disabled first.
    fn enable_module(&mut self) -> Result<(), Error> {
        self.regs.modify(Reg::Mcr, |value| value | mcr::MDIS);
        self.wait_mcr(Condition::ModuleDisabled, |value| value & mcr::LPMACK != 0)?;
        self.state = State::Disabled;

        // Clock source is only writable while disabled
        self.regs.modify(Reg::Ctrl1, |value| value & !ctrl1::CLKSRC);
        self.state = State::ClockSelectPending;

        self.regs.modify(Reg::Mcr, |value| value & !mcr::MDIS);
        self.state = State::Enabled;
        debug!("module enabled on the oscillator clock");

        Ok(())
    }

    fn wait_mcr<F>(&mut self, condition: Condition, done: F) -> Result<(), Timeout>
    where
        F: Fn(u32) -> bool,
    {
        let regs = &mut self.regs;

        self.config
            .wait
            .wait_until(condition, || done(regs.read(Reg::Mcr)))
    }

    fn enter_freeze(&mut self) -> Result<(), Error> {
        self.regs
            .modify(Reg::Mcr, |value| value | mcr::FRZ | mcr::HALT);
        self.state = State::FreezeRequested;

        self.wait_mcr(Condition::FreezeEntered, |value| value & mcr::FRZACK != 0)?;
        self.state = State::Frozen;
        trace!("freeze mode entered");

        Ok(())
    }

    fn exit_freeze(&mut self) -> Result<(), Error> {
        self.regs
            .modify(Reg::Mcr, |value| value & !(mcr::FRZ | mcr::HALT));
        self.state = State::FreezeExitRequested;

        self.wait_mcr(Condition::FreezeExited, |value| value & mcr::FRZACK == 0)?;
        self.wait_mcr(Condition::ModuleReady, |value| value & mcr::NOTRDY == 0)?;
        self.state = State::Ready;
        trace!("freeze mode left, module ready");

        Ok(())
    }

    /// Programs the freeze-protected registers. Must run in freeze mode.
    fn configure(&mut self) {
        self.regs.modify(Reg::Mcr, |value| {
            (value & !(mcr::IDAM_MASK | mcr::MAXMB_MASK))
                | mcr::IRMQ
                | mcr::SRXDIS
                | mcr::RFEN
                | mcr::IDAM_FORMAT_A
                | TX_MAILBOX as u32
        });
        self.regs
            .modify(Reg::Ctrl2, |value| value & !ctrl2::RFFN_MASK);

        let timing = self.config.bit_timing.ctrl1_fields();
        self.regs
            .modify(Reg::Ctrl1, |value| (value & !ctrl1::TIMING_MASK) | timing);

        // Buffer RAM and masks come out of reset undefined
        for index in 0..RAM_WORDS {
            self.regs.write(Reg::Ram(index), 0);
        }
        for index in 0..RXIMR_COUNT {
            self.regs.write(Reg::RxImr(index), u32::MAX);
        }
        self.regs.write(Reg::RxMgMask, u32::MAX);
        self.regs.write(Reg::RxFgMask, u32::MAX);

        self.regs.write(
            Reg::Ram(mailbox::ram_word(TX_MAILBOX, word::CS)),
            codec::tx_descriptor(Code::TxInactive),
        );

        self.regs.write(Reg::Imask1, 0);
        self.regs.write(Reg::Iflag1, u32::MAX);

        debug!(
            "controller configured: CTRL1 timing {:#x}, TX mailbox {}",
            timing, TX_MAILBOX
        );
    }

    /// Accepts frames with identifier `id` only, replacing whatever was
    /// installed before.
    pub fn install_identifier(&mut self, id: u32) -> Result<(), Error> {
        self.install_identifiers(&[id])
    }

    /// Accepts frames with any of `ids`, replacing whatever was installed
    /// before. At most [`Config::filter_slots`] identifiers are allowed.
    ///
    /// The controller is frozen while the table is rewritten, frames sent
    /// during that time are missed.
    pub fn install_identifiers(&mut self, ids: &[u32]) -> Result<(), Error> {
        let first = *ids.first().ok_or(Error::NoIdentifiers)?;

        if ids.len() > self.config.filter_slots as usize {
            return Err(Error::TooManyIdentifiers(
                ids.len(),
                self.config.filter_slots,
            ));
        }

        // Unused elements repeat the first identifier, a cleared element
        // would accept identifier 0
        let mut elements = [0; FILTER_ELEMENTS];
        for (slot, element) in elements.iter_mut().enumerate() {
            let id = ids.get(slot).copied().unwrap_or(first);
            *element = codec::filter_element(standard_id(id)?);
        }

        self.enter_freeze()?;

        for (slot, element) in elements.into_iter().enumerate() {
            let slot = slot as u8;

            self.regs.write(Reg::Ram(FILTER_TABLE_WORD + slot), element);
            self.regs
                .write(Reg::RxImr(slot), codec::FILTER_EXACT_MASK);
        }

        self.exit_freeze()?;
        debug!("accepting identifiers {:?}", ids);

        Ok(())
    }

    /// Loads `frame` into the transmit mailbox and starts the transmission.
    fn stage(&mut self, frame: &Frame) -> Result<(), Error> {
        let cs = self
            .regs
            .read(Reg::Ram(mailbox::ram_word(TX_MAILBOX, word::CS)));

        if codec::code_of(cs) == Ok(Code::TxData) {
            return Err(Error::MailboxBusy);
        }

        // Drop the flag of an earlier transmission nobody waited for
        self.regs.write(Reg::Iflag1, TX_FLAG);

        let [data0, data1] = frame.payload();
        self.regs
            .write(Reg::Ram(mailbox::ram_word(TX_MAILBOX, word::DATA0)), data0);
        self.regs
            .write(Reg::Ram(mailbox::ram_word(TX_MAILBOX, word::DATA1)), data1);
        self.regs.write(
            Reg::Ram(mailbox::ram_word(TX_MAILBOX, word::ID)),
            codec::id_to_word(frame.standard_id()),
        );

        // Must be the last write, it hands the mailbox to the controller
        self.regs.write(
            Reg::Ram(mailbox::ram_word(TX_MAILBOX, word::CS)),
            codec::tx_descriptor(Code::TxData),
        );

        Ok(())
    }

    /// Sends `frame` and waits until the controller reports it transmitted.
    ///
    /// An earlier transmission still in the mailbox is waited for first.
    /// [`Error::MailboxBusy`] is returned when a bounded wait gives up on it.
    pub fn transmit(&mut self, frame: &Frame) -> Result<(), Error> {
        let regs = &mut self.regs;
        self.config
            .wait
            .wait_until(Condition::MailboxReleased, || {
                let cs = regs.read(Reg::Ram(mailbox::ram_word(TX_MAILBOX, word::CS)));
                codec::code_of(cs) != Ok(Code::TxData)
            })
            .map_err(|_| Error::MailboxBusy)?;

        self.stage(frame)?;

        let regs = &mut self.regs;
        self.config
            .wait
            .wait_until(Condition::TransmitComplete, || {
                regs.read(Reg::Iflag1) & TX_FLAG != 0
            })?;

        self.regs.write(Reg::Iflag1, TX_FLAG);
        trace!("transmitted {:?}", frame);

        Ok(())
    }

    /// Takes the oldest frame out of the receive FIFO without waiting.
    pub fn receive(&mut self) -> Result<Frame, Error> {
        let flags = self.regs.read(Reg::Iflag1);

        if flags & iflag::FIFO_AVAILABLE == 0 {
            return Err(Error::NoFrameAvailable);
        }

        let id = self
            .regs
            .read(Reg::Ram(mailbox::ram_word(FIFO_OUTPUT, word::ID)));
        let data0 = self
            .regs
            .read(Reg::Ram(mailbox::ram_word(FIFO_OUTPUT, word::DATA0)));
        let data1 = self
            .regs
            .read(Reg::Ram(mailbox::ram_word(FIFO_OUTPUT, word::DATA1)));
        let hit = self.regs.read(Reg::RxFir) & rxfir::IDHIT_MASK;

        // Releases the buffer lock taken by the reads above
        self.regs.read(Reg::Timer);
        self.regs.write(Reg::Iflag1, iflag::FIFO_AVAILABLE);

        if flags & iflag::FIFO_OVERFLOW != 0 {
            self.regs.write(Reg::Iflag1, iflag::FIFO_OVERFLOW);
            warn!("receive FIFO overflowed, frames were dropped");
        }

        let frame = Frame::from_parts(codec::id_from_word(id), [data0, data1]);
        trace!("received {:?} through filter element {}", frame, hit);

        Ok(frame)
    }

    /// Like [`FlexCan::receive`], writing into `frame`. It is left untouched
    /// when nothing was received.
    pub fn receive_into(&mut self, frame: &mut Frame) -> Result<(), Error> {
        *frame = self.receive()?;

        Ok(())
    }
}

impl<R: Registers> embedded_can::nb::Can for FlexCan<R> {
    type Frame = Frame;
    type Error = Error;

    /// Starts the transmission without waiting for it. The mailbox is never
    /// preempted, so `Ok(None)` is the only success.
    fn transmit(&mut self, frame: &Frame) -> nb::Result<Option<Frame>, Error> {
        match self.stage(frame) {
            Ok(()) => Ok(None),
            Err(Error::MailboxBusy) => Err(nb::Error::WouldBlock),
            Err(error) => Err(nb::Error::Other(error)),
        }
    }

    fn receive(&mut self) -> nb::Result<Frame, Error> {
        FlexCan::receive(self).map_err(|error| match error {
            Error::NoFrameAvailable => nb::Error::WouldBlock,
            error => nb::Error::Other(error),
        })
    }
}

impl<R: Registers> embedded_can::blocking::Can for FlexCan<R> {
    type Frame = Frame;
    type Error = Error;

    fn transmit(&mut self, frame: &Frame) -> Result<(), Error> {
        FlexCan::transmit(self, frame)
    }

    /// Waits for a frame as long as the [`WaitPolicy`](crate::WaitPolicy)
    /// allows, then returns [`Error::NoFrameAvailable`].
    fn receive(&mut self) -> Result<Frame, Error> {
        let regs = &mut self.regs;
        self.config
            .wait
            .wait_until(Condition::FrameAvailable, || {
                regs.read(Reg::Iflag1) & iflag::FIFO_AVAILABLE != 0
            })
            .map_err(|_| Error::NoFrameAvailable)?;

        FlexCan::receive(self)
    }
}
