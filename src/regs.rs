use num_enum::IntoPrimitive;

/// GPIO port owning the CAN RX/TX pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Port {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
    #[default]
    E = 4,
}

/// FlexCAN module instance, used by [`Mmio`] to locate the controller and its
/// clock gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Instance {
    Can0,
    Can1,
    Can2,
}

/// A 32-bit register location the driver touches.
///
/// Each peripheral is named by what the driver uses it for, so the same
/// sequence can run against memory-mapped hardware ([`Mmio`]) or a simulated
/// register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    /// System oscillator control and status (`SCG_SOSCCSR`)
    SoscCsr,
    /// System oscillator output dividers (`SCG_SOSCDIV`)
    SoscDiv,
    /// System oscillator reference and range (`SCG_SOSCCFG`)
    SoscCfg,
    /// Bus clock gate of the CAN module (`PCC_FlexCANn`)
    PccCan,
    /// Clock gate of a GPIO port (`PCC_PORTx`)
    PccPort(Port),
    /// Pin control register of `pin` on a port (`PORTx_PCRn`)
    Pcr(Port, u8),
    /// Module configuration (`CANn_MCR`)
    Mcr,
    /// Control 1, holds the bit timing (`CANn_CTRL1`)
    Ctrl1,
    /// Free-running timer, read to release a locked buffer (`CANn_TIMER`)
    Timer,
    /// Receive mailboxes global mask (`CANn_RXMGMASK`)
    RxMgMask,
    /// Interrupt masks for buffers 0-31 (`CANn_IMASK1`)
    Imask1,
    /// Interrupt flags for buffers 0-31, write-one-to-clear (`CANn_IFLAG1`)
    Iflag1,
    /// Control 2, holds the FIFO filter count (`CANn_CTRL2`)
    Ctrl2,
    /// Receive FIFO global mask (`CANn_RXFGMASK`)
    RxFgMask,
    /// Receive FIFO information, holds the filter hit (`CANn_RXFIR`)
    RxFir,
    /// Word of the message buffer RAM (`CANn_RAMn`)
    Ram(u8),
    /// Individual receive mask (`CANn_RXIMRn`)
    RxImr(u8),
}

/// Register access used by the driver.
///
/// Reads take `&mut self` because on real hardware some of them have side
/// effects (reading a receive buffer locks it, reading the timer unlocks it).
pub trait Registers {
    fn read(&mut self, reg: Reg) -> u32;

    fn write(&mut self, reg: Reg, value: u32);

    /// Read-modify-write. Never use this on [`Reg::Iflag1`]: writing back a set
    /// flag clears it.
    fn modify<F: FnOnce(u32) -> u32>(&mut self, reg: Reg, f: F) {
        let value = self.read(reg);
        self.write(reg, f(value));
    }
}

impl<T: Registers + ?Sized> Registers for &mut T {
    fn read(&mut self, reg: Reg) -> u32 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Reg, value: u32) {
        (**self).write(reg, value)
    }
}

pub(crate) mod scg {
    /// Oscillator enable
    pub const SOSCEN: u32 = 1 << 0;
    /// Control register lock
    pub const LK: u32 = 1 << 23;
    /// Oscillator output valid (read-only)
    pub const SOSCVLD: u32 = 1 << 24;

    /// External crystal selected as reference
    pub const EREFS: u32 = 1 << 2;
    pub const RANGE_SHIFT: u32 = 4;
    pub const RANGE_MASK: u32 = 0b11 << RANGE_SHIFT;

    /// `SOSCDIVn` encoding of divide-by-1
    pub const DIV_BY_1: u32 = 0b001;
    pub const DIV1_SHIFT: u32 = 0;
    pub const DIV2_SHIFT: u32 = 8;
}

pub(crate) mod pcc {
    /// Clock gate control
    pub const CGC: u32 = 1 << 30;
}

pub(crate) mod port {
    pub const MUX_SHIFT: u32 = 8;
    pub const MUX_MASK: u32 = 0b111 << MUX_SHIFT;

    pub const fn mux(alternative: u8) -> u32 {
        ((alternative as u32) << MUX_SHIFT) & MUX_MASK
    }
}

pub(crate) mod mcr {
    /// Module disable
    pub const MDIS: u32 = 1 << 31;
    /// Freeze enable
    pub const FRZ: u32 = 1 << 30;
    /// Receive FIFO enable
    pub const RFEN: u32 = 1 << 29;
    /// Halt, requests freeze mode while `FRZ` is set
    pub const HALT: u32 = 1 << 28;
    /// Module not synchronized to the bus (read-only)
    pub const NOTRDY: u32 = 1 << 27;
    /// Freeze mode acknowledge (read-only)
    pub const FRZACK: u32 = 1 << 24;
    /// Low-power mode acknowledge (read-only)
    pub const LPMACK: u32 = 1 << 20;
    /// Self reception disable
    pub const SRXDIS: u32 = 1 << 17;
    /// Individual receive masking and queue enable
    pub const IRMQ: u32 = 1 << 16;
    pub const IDAM_SHIFT: u32 = 8;
    pub const IDAM_MASK: u32 = 0b11 << IDAM_SHIFT;
    /// ID acceptance format A: one full identifier per filter element
    pub const IDAM_FORMAT_A: u32 = 0b00 << IDAM_SHIFT;
    pub const MAXMB_MASK: u32 = 0x7F;
}

pub(crate) mod ctrl1 {
    pub const PRESDIV_SHIFT: u32 = 24;
    pub const RJW_SHIFT: u32 = 22;
    pub const PSEG1_SHIFT: u32 = 19;
    pub const PSEG2_SHIFT: u32 = 16;
    pub const PROPSEG_SHIFT: u32 = 0;
    /// Clock source: 0 selects the oscillator, 1 the peripheral clock
    pub const CLKSRC: u32 = 1 << 13;

    pub const TIMING_MASK: u32 = (0xFF << PRESDIV_SHIFT)
        | (0b11 << RJW_SHIFT)
        | (0b111 << PSEG1_SHIFT)
        | (0b111 << PSEG2_SHIFT)
        | (0b111 << PROPSEG_SHIFT);
}

pub(crate) mod ctrl2 {
    pub const RFFN_SHIFT: u32 = 24;
    pub const RFFN_MASK: u32 = 0xF << RFFN_SHIFT;
}

pub(crate) mod iflag {
    /// Receive FIFO holds at least one frame
    pub const FIFO_AVAILABLE: u32 = 1 << 5;
    /// Receive FIFO dropped a frame
    pub const FIFO_OVERFLOW: u32 = 1 << 7;
}

pub(crate) mod rxfir {
    /// Index of the filter element that accepted the FIFO output frame
    pub const IDHIT_MASK: u32 = 0x1FF;
}

/// Number of words in the message buffer RAM (32 buffers of 4 words).
pub const RAM_WORDS: u8 = 128;

/// Number of individual receive mask registers.
pub const RXIMR_COUNT: u8 = 32;

const SCG_BASE: usize = 0x4006_4000;
const PCC_BASE: usize = 0x4006_5000;
const PORT_BASES: [usize; 5] = [
    0x4004_9000,
    0x4004_A000,
    0x4004_B000,
    0x4004_C000,
    0x4004_D000,
];

impl Instance {
    const fn base(self) -> usize {
        match self {
            Instance::Can0 => 0x4002_4000,
            Instance::Can1 => 0x4002_5000,
            Instance::Can2 => 0x4002_B000,
        }
    }

    const fn pcc_offset(self) -> usize {
        match self {
            Instance::Can0 => 0x90,
            Instance::Can1 => 0x94,
            Instance::Can2 => 0xAC,
        }
    }
}

/// Memory-mapped registers of an S32K1xx FlexCAN instance and the clock and
/// port blocks it depends on.
pub struct Mmio {
    instance: Instance,
}

impl Mmio {
    /// # Safety
    ///
    /// The caller must be running on a device with the S32K1xx memory map and
    /// must not access the same controller, its clock gate or its pins through
    /// any other handle while this one is alive.
    pub unsafe fn new(instance: Instance) -> Self {
        Self { instance }
    }

    pub fn instance(&self) -> Instance {
        self.instance
    }

    fn address(&self, reg: Reg) -> usize {
        let can = self.instance.base();

        match reg {
            Reg::SoscCsr => SCG_BASE + 0x100,
            Reg::SoscDiv => SCG_BASE + 0x104,
            Reg::SoscCfg => SCG_BASE + 0x108,
            Reg::PccCan => PCC_BASE + self.instance.pcc_offset(),
            Reg::PccPort(port) => PCC_BASE + 0x124 + 4 * u8::from(port) as usize,
            Reg::Pcr(port, pin) => PORT_BASES[u8::from(port) as usize] + 4 * pin as usize,
            Reg::Mcr => can,
            Reg::Ctrl1 => can + 0x04,
            Reg::Timer => can + 0x08,
            Reg::RxMgMask => can + 0x10,
            Reg::Imask1 => can + 0x28,
            Reg::Iflag1 => can + 0x30,
            Reg::Ctrl2 => can + 0x34,
            Reg::RxFgMask => can + 0x48,
            Reg::RxFir => can + 0x4C,
            Reg::Ram(word) => can + 0x80 + 4 * word as usize,
            Reg::RxImr(index) => can + 0x880 + 4 * index as usize,
        }
    }
}

impl Registers for Mmio {
    fn read(&mut self, reg: Reg) -> u32 {
        // SAFETY: `address` only yields registers of the owned instance, see `Mmio::new`
        unsafe { core::ptr::read_volatile(self.address(reg) as *const u32) }
    }

    fn write(&mut self, reg: Reg, value: u32) {
        // SAFETY: as above
        unsafe { core::ptr::write_volatile(self.address(reg) as *mut u32, value) }
    }
}
