use core::num::{NonZeroU16, NonZeroU8};

use heapless::Vec;
use num_enum::IntoPrimitive;

use crate::{regs::ctrl1, Port, WaitPolicy, FILTER_ELEMENTS, MAX_STANDARD_ID};

/// Frequency of the asynchronous clock the default [`BitTiming`] assumes.
pub const OSCILLATOR_HZ: u32 = 8_000_000;

/// Nominal bit timing programmed into `CTRL1`.
///
/// All lengths are in time quanta (Tq) and are given as real values, the
/// register encoding subtracts one where the hardware requires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitTiming {
    /// Divider from the oscillator clock to the time quantum.
    /// Valid range: 1 to 256.
    pub prescaler: NonZeroU16,
    /// Propagation segment.
    /// Valid range: 1 to 8.
    pub propagation_segment: NonZeroU8,
    /// Phase segment 1.
    /// Valid range: 1 to 8.
    pub phase_segment_1: NonZeroU8,
    /// Phase segment 2.
    /// Valid range: 2 to 8.
    pub phase_segment_2: NonZeroU8,
    /// Resynchronization jump width. Must not exceed either phase segment.
    /// Valid range: 1 to 4.
    pub sync_jump_width: NonZeroU8,
}

impl Default for BitTiming {
    #[inline]
    fn default() -> Self {
        // 8 MHz oscillator, 16 Tq per bit: 500 kbit/s. CTRL1 fields 0x00DB_0006
        Self {
            prescaler: unwrap!(NonZeroU16::new(1)),
            propagation_segment: unwrap!(NonZeroU8::new(7)),
            phase_segment_1: unwrap!(NonZeroU8::new(4)),
            phase_segment_2: unwrap!(NonZeroU8::new(4)),
            sync_jump_width: unwrap!(NonZeroU8::new(4)),
        }
    }
}

impl BitTiming {
    /// Number of time quanta in one bit, including the sync segment.
    pub fn quanta_per_bit(&self) -> u32 {
        1 + self.propagation_segment.get() as u32
            + self.phase_segment_1.get() as u32
            + self.phase_segment_2.get() as u32
    }

    /// Resulting bit rate for the given controller clock.
    pub fn bit_rate(&self, clock_hz: u32) -> u32 {
        clock_hz / (self.prescaler.get() as u32 * self.quanta_per_bit())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let prescaler = self.prescaler.get();
        let propagation = self.propagation_segment.get();
        let phase_1 = self.phase_segment_1.get();
        let phase_2 = self.phase_segment_2.get();
        let jump = self.sync_jump_width.get();

        if prescaler > 256 {
            return Err(ConfigError::PrescalerOutOfRange(prescaler));
        }

        if propagation > 8 {
            return Err(ConfigError::PropagationSegmentOutOfRange(propagation));
        }

        if phase_1 > 8 {
            return Err(ConfigError::PhaseSegment1OutOfRange(phase_1));
        }

        if !(2..=8).contains(&phase_2) {
            return Err(ConfigError::PhaseSegment2OutOfRange(phase_2));
        }

        if jump > 4 || jump > phase_1 || jump > phase_2 {
            return Err(ConfigError::SyncJumpWidthOutOfRange(jump));
        }

        Ok(())
    }

    /// `CTRL1` bits for this timing. Assumes [`BitTiming::validate`] passed.
    pub(crate) fn ctrl1_fields(&self) -> u32 {
        let field = |value: u32, shift: u32| (value - 1) << shift;

        field(self.prescaler.get() as u32, ctrl1::PRESDIV_SHIFT)
            | field(self.sync_jump_width.get() as u32, ctrl1::RJW_SHIFT)
            | field(self.phase_segment_1.get() as u32, ctrl1::PSEG1_SHIFT)
            | field(self.phase_segment_2.get() as u32, ctrl1::PSEG2_SHIFT)
            | field(self.propagation_segment.get() as u32, ctrl1::PROPSEG_SHIFT)
    }
}

/// Frequency range of the external crystal (`SOSCCFG.RANGE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OscillatorRange {
    /// 32 kHz crystals
    Low = 0b01,
    /// 1 MHz to 8 MHz
    #[default]
    Medium = 0b10,
    /// 8 MHz to 40 MHz
    High = 0b11,
}

/// Pins carrying the CAN RX and TX signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pins {
    pub port: Port,
    pub rx: u8,
    pub tx: u8,
    /// Pin mux alternative selecting the CAN function
    pub mux: u8,
}

impl Default for Pins {
    fn default() -> Self {
        // PTE4 = CAN0_RX, PTE5 = CAN0_TX on ALT5
        Self {
            port: Port::E,
            rx: 4,
            tx: 5,
            mux: 5,
        }
    }
}

/// Driver config struct
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub bit_timing: BitTiming,
    pub oscillator_range: OscillatorRange,
    pub pins: Pins,
    /// Applied to every status poll, see [`WaitPolicy`]
    pub wait: WaitPolicy,
    /// How many identifiers [`FlexCan::install_identifiers`](crate::FlexCan::install_identifiers)
    /// accepts. The FIFO filter table always has [`FILTER_ELEMENTS`] entries.
    pub filter_slots: u8,
    /// Identifiers installed by [`FlexCan::initialize`](crate::FlexCan::initialize).
    /// Left empty, filtering is set up by a later `install_identifier` call.
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    pub accepted_ids: Vec<u32, FILTER_ELEMENTS>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bit_timing: Default::default(),
            oscillator_range: Default::default(),
            pins: Default::default(),
            wait: Default::default(),
            filter_slots: 1,
            accepted_ids: Vec::new(),
        }
    }
}

impl Config {
    /// Replaces the identifiers installed during initialization. Raises the
    /// filter slot count if the list needs more.
    pub fn with_accepted_ids(mut self, ids: &[u32]) -> Result<Self, ConfigError> {
        self.accepted_ids = Vec::from_slice(ids)
            .map_err(|_| ConfigError::TooManyIdentifiers(ids.len(), FILTER_ELEMENTS as u8))?;
        self.filter_slots = self.filter_slots.max(ids.len() as u8);
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bit_timing.validate()?;

        if self.filter_slots == 0 || self.filter_slots as usize > FILTER_ELEMENTS {
            return Err(ConfigError::FilterSlotsOutOfRange(self.filter_slots));
        }

        for pin in [self.pins.rx, self.pins.tx] {
            if pin > 31 {
                return Err(ConfigError::PinOutOfRange(pin));
            }
        }

        if self.pins.mux > 7 {
            return Err(ConfigError::PinMuxOutOfRange(self.pins.mux));
        }

        if self.accepted_ids.len() > self.filter_slots as usize {
            return Err(ConfigError::TooManyIdentifiers(
                self.accepted_ids.len(),
                self.filter_slots,
            ));
        }

        if let Some(&id) = self.accepted_ids.iter().find(|&&id| id > MAX_STANDARD_ID) {
            return Err(ConfigError::InvalidIdentifier(id));
        }

        Ok(())
    }
}

/// Rejected [`Config`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("Prescaler ({0:?}) is out of the valid range (1..=256)")]
    PrescalerOutOfRange(u16),
    #[error("Propagation segment ({0:?}) is out of the valid range (1..=8)")]
    PropagationSegmentOutOfRange(u8),
    #[error("Phase segment 1 ({0:?}) is out of the valid range (1..=8)")]
    PhaseSegment1OutOfRange(u8),
    #[error("Phase segment 2 ({0:?}) is out of the valid range (2..=8)")]
    PhaseSegment2OutOfRange(u8),
    #[error("Jump width ({0:?}) must be in 1..=4 and not exceed either phase segment")]
    SyncJumpWidthOutOfRange(u8),
    #[error("Filter slot count ({0:?}) is out of the valid range (1..=8)")]
    FilterSlotsOutOfRange(u8),
    #[error("Pin number ({0:?}) is out of the valid range (0..=31)")]
    PinOutOfRange(u8),
    #[error("Pin mux alternative ({0:?}) is out of the valid range (0..=7)")]
    PinMuxOutOfRange(u8),
    #[error("Accepted identifier ({0:#x}) is out of the standard range (0..=0x7FF)")]
    InvalidIdentifier(u32),
    #[error("Got ({0:?}) accepted identifiers but only ({1:?}) filter slots")]
    TooManyIdentifiers(usize, u8),
}
