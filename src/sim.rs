//! Simulated S32K1xx clock, port and FlexCAN registers for the unit tests.
//!
//! Status bits change a few polls after they are requested, configuration
//! writes issued in the wrong mode are dropped and recorded, and every access
//! is logged so tests can check the order of the initialization sequence.

use std::{cell::RefCell, collections::VecDeque, rc::Rc, vec::Vec};

use crate::{
    codec,
    mailbox::{self, word, Code, FILTER_TABLE_WORD},
    regs::{ctrl1, ctrl2, iflag, mcr, pcc, scg, RAM_WORDS, RXIMR_COUNT},
    Condition, Frame, Reg, Registers,
};

/// Polls before a requested status change becomes visible.
const LATENCY: u32 = 3;

/// Frames the receive FIFO holds before it overflows.
const FIFO_DEPTH: usize = 6;

/// Sender index used for frames injected by a test.
const EXTERNAL_NODE: usize = usize::MAX;

/// `PCC` peripheral present flag, always set.
const PCC_PR: u32 = 1 << 31;

/// Read-only `MCR` status flags.
const MCR_STATUS: u32 = mcr::NOTRDY | mcr::FRZACK | mcr::LPMACK;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read(Reg, u32),
    Write(Reg, u32),
}

/// A configuration write the hardware would have ignored or faulted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Controller or port register touched with its clock gated off
    ClockGated(Reg),
    /// Freeze-only field written outside freeze mode
    NotFrozen(Reg),
    /// Disable-only field written while the module was enabled
    NotDisabled(Reg),
    /// Oscillator configuration written while it was running or locked
    OscillatorLocked(Reg),
}

/// Frames seen on the bus, tagged with the index of the sending node.
pub type Bus = Rc<RefCell<Vec<(usize, Frame)>>>;

pub fn bus() -> Bus {
    Rc::new(RefCell::new(Vec::new()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Disabled,
    Freezing(u32),
    Frozen,
    Unfreezing(u32),
    Syncing(u32),
    Running,
}

pub struct SimFlexCan {
    node: usize,
    bus: Bus,
    cursor: usize,

    sosccsr: u32,
    soscdiv: u32,
    sosccfg: u32,
    osc_settle: u32,

    pcc_can: u32,
    pcc_port: [u32; 5],
    pcr: [[u32; 32]; 5],

    mode: Mode,
    mcr: u32,
    ctrl1: u32,
    ctrl2: u32,
    timer: u32,
    rxmgmask: u32,
    rxfgmask: u32,
    imask1: u32,
    iflag1: u32,
    rxfir: u32,
    ram: [u32; RAM_WORDS as usize],
    rximr: [u32; RXIMR_COUNT as usize],

    fifo: VecDeque<(Frame, u32)>,
    pending_tx: Option<(u8, u32)>,
    stuck: Option<Condition>,

    pub log: Vec<Access>,
    pub violations: Vec<Violation>,
}

impl SimFlexCan {
    /// A controller straight out of reset, attached to `bus` as node `node`.
    pub fn new(bus: &Bus, node: usize) -> Self {
        Self {
            node,
            bus: Rc::clone(bus),
            cursor: 0,

            // Left locked by the boot code
            sosccsr: scg::LK,
            soscdiv: 0,
            sosccfg: 0,
            osc_settle: 0,

            pcc_can: 0,
            pcc_port: [0; 5],
            pcr: [[0; 32]; 5],

            mode: Mode::Disabled,
            mcr: mcr::MDIS | mcr::FRZ | mcr::HALT | 0x0F,
            // Boot code selected the peripheral clock
            ctrl1: ctrl1::CLKSRC,
            ctrl2: 0x00B0_0000 | (1 << ctrl2::RFFN_SHIFT),
            timer: 0,
            rxmgmask: 0,
            rxfgmask: 0,
            imask1: 0,
            iflag1: 0,
            rxfir: 0,
            ram: [0; RAM_WORDS as usize],
            rximr: [0; RXIMR_COUNT as usize],

            fifo: VecDeque::new(),
            pending_tx: None,
            stuck: None,

            log: Vec::new(),
            violations: Vec::new(),
        }
    }

    /// Keeps the status bit behind `condition` from ever changing.
    pub fn stick(&mut self, condition: Condition) {
        self.stuck = Some(condition);
    }

    pub fn unstick(&mut self) {
        self.stuck = None;
    }

    /// Puts a frame on the bus as if another node sent it.
    pub fn inject(&self, frame: Frame) {
        self.bus.borrow_mut().push((EXTERNAL_NODE, frame));
    }

    /// Frames this node put on the bus.
    pub fn sent(&self) -> Vec<Frame> {
        self.bus
            .borrow()
            .iter()
            .filter(|(sender, _)| *sender == self.node)
            .map(|(_, frame)| *frame)
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.mode == Mode::Running
    }

    pub fn raw(&self, reg: Reg) -> u32 {
        match reg {
            Reg::SoscCsr => self.sosccsr,
            Reg::SoscDiv => self.soscdiv,
            Reg::SoscCfg => self.sosccfg,
            Reg::PccCan => self.pcc_can | PCC_PR,
            Reg::PccPort(port) => self.pcc_port[u8::from(port) as usize] | PCC_PR,
            Reg::Pcr(port, pin) => self.pcr[u8::from(port) as usize][pin as usize],
            Reg::Mcr => (self.mcr & !MCR_STATUS) | self.status_bits(),
            Reg::Ctrl1 => self.ctrl1,
            Reg::Timer => self.timer,
            Reg::RxMgMask => self.rxmgmask,
            Reg::Imask1 => self.imask1,
            Reg::Iflag1 => self.iflag1,
            Reg::Ctrl2 => self.ctrl2,
            Reg::RxFgMask => self.rxfgmask,
            Reg::RxFir => self.rxfir,
            Reg::Ram(index) => self.ram[index as usize],
            Reg::RxImr(index) => self.rximr[index as usize],
        }
    }

    fn status_bits(&self) -> u32 {
        match self.mode {
            Mode::Disabled if self.stuck_on(Condition::ModuleDisabled) => mcr::NOTRDY,
            Mode::Disabled => mcr::LPMACK | mcr::NOTRDY,
            Mode::Freezing(_) | Mode::Syncing(_) => mcr::NOTRDY,
            Mode::Frozen | Mode::Unfreezing(_) => mcr::FRZACK | mcr::NOTRDY,
            Mode::Running => 0,
        }
    }

    fn stuck_on(&self, condition: Condition) -> bool {
        self.stuck == Some(condition)
    }

    fn advance(&mut self) {
        self.mode = match self.mode {
            Mode::Freezing(_) if self.stuck_on(Condition::FreezeEntered) => self.mode,
            Mode::Unfreezing(_) if self.stuck_on(Condition::FreezeExited) => self.mode,
            Mode::Syncing(_) if self.stuck_on(Condition::ModuleReady) => self.mode,
            Mode::Freezing(0) => Mode::Frozen,
            Mode::Freezing(n) => Mode::Freezing(n - 1),
            Mode::Unfreezing(0) => Mode::Syncing(LATENCY),
            Mode::Unfreezing(n) => Mode::Unfreezing(n - 1),
            Mode::Syncing(0) => Mode::Running,
            Mode::Syncing(n) => Mode::Syncing(n - 1),
            mode => mode,
        };
    }

    fn check_clock(&mut self, reg: Reg) {
        let gated = match reg {
            Reg::SoscCsr | Reg::SoscDiv | Reg::SoscCfg | Reg::PccCan | Reg::PccPort(_) => false,
            Reg::Pcr(port, _) => self.pcc_port[u8::from(port) as usize] & pcc::CGC == 0,
            _ => self.pcc_can & pcc::CGC == 0,
        };

        if gated {
            self.violations.push(Violation::ClockGated(reg));
        }
    }

    /// Merges `value` into `current`, keeping bits outside `writable` and
    /// recording a violation when the write tried to change them.
    fn guarded(&mut self, current: u32, value: u32, writable: u32, why: Violation) -> u32 {
        if (current ^ value) & !writable != 0 {
            self.violations.push(why);
        }

        (current & !writable) | (value & writable)
    }

    fn frozen(&self) -> bool {
        self.mode == Mode::Frozen
    }

    fn read_sosccsr(&mut self) -> u32 {
        if self.sosccsr & scg::SOSCEN != 0 && !self.stuck_on(Condition::OscillatorValid) {
            if self.osc_settle > 0 {
                self.osc_settle -= 1;
            } else {
                self.sosccsr |= scg::SOSCVLD;
            }
        }

        self.sosccsr
    }

    fn write_sosccsr(&mut self, value: u32) {
        if self.sosccsr & scg::LK != 0 {
            // Only the lock bit itself is writable while locked
            let next = (self.sosccsr & !scg::LK) | (value & scg::LK);
            if (next ^ value) & scg::SOSCEN != 0 {
                self.violations.push(Violation::OscillatorLocked(Reg::SoscCsr));
            }
            self.sosccsr = next;
            return;
        }

        let enabling = value & scg::SOSCEN != 0 && self.sosccsr & scg::SOSCEN == 0;
        let valid = if value & scg::SOSCEN != 0 && !enabling {
            self.sosccsr & scg::SOSCVLD
        } else {
            0
        };

        if enabling {
            self.osc_settle = LATENCY;
        }

        self.sosccsr = (value & (scg::SOSCEN | scg::LK)) | valid;
    }

    fn write_mcr(&mut self, value: u32) {
        let config_bits = mcr::RFEN | mcr::SRXDIS | mcr::IRMQ | mcr::IDAM_MASK | mcr::MAXMB_MASK;
        let writable = if self.frozen() {
            !MCR_STATUS
        } else {
            !MCR_STATUS & !config_bits
        };

        let next = self.guarded(
            self.mcr & !MCR_STATUS,
            value & !MCR_STATUS,
            writable,
            Violation::NotFrozen(Reg::Mcr),
        );
        let freeze_requested = next & (mcr::FRZ | mcr::HALT) == mcr::FRZ | mcr::HALT;

        self.mode = if next & mcr::MDIS != 0 {
            Mode::Disabled
        } else {
            match self.mode {
                Mode::Disabled if freeze_requested => Mode::Freezing(LATENCY),
                Mode::Disabled => Mode::Syncing(LATENCY),
                Mode::Freezing(_) if !freeze_requested => Mode::Syncing(LATENCY),
                Mode::Frozen if !freeze_requested => Mode::Unfreezing(LATENCY),
                Mode::Unfreezing(_) | Mode::Syncing(_) | Mode::Running if freeze_requested => {
                    Mode::Freezing(LATENCY)
                }
                mode => mode,
            }
        };
        self.mcr = next;
    }

    fn write_ctrl1(&mut self, value: u32) {
        let (writable, why) = match self.mode {
            Mode::Disabled => (ctrl1::CLKSRC, Violation::NotFrozen(Reg::Ctrl1)),
            Mode::Frozen => (!ctrl1::CLKSRC, Violation::NotDisabled(Reg::Ctrl1)),
            _ => (0, Violation::NotFrozen(Reg::Ctrl1)),
        };

        self.ctrl1 = self.guarded(self.ctrl1, value, writable, why);
    }

    fn write_frozen_only(&mut self, reg: Reg, current: u32, value: u32) -> u32 {
        let writable = if self.frozen() { u32::MAX } else { 0 };

        self.guarded(current, value, writable, Violation::NotFrozen(reg))
    }

    fn filter_elements(&self) -> u8 {
        if self.mcr & mcr::RFEN == 0 {
            return 0;
        }

        let rffn = ((self.ctrl2 & ctrl2::RFFN_MASK) >> ctrl2::RFFN_SHIFT) as u8;
        8 * (rffn + 1)
    }

    fn is_filter_word(&self, index: u8) -> bool {
        (FILTER_TABLE_WORD..FILTER_TABLE_WORD + self.filter_elements()).contains(&index)
    }

    fn write_ram(&mut self, index: u8, value: u32) {
        if self.is_filter_word(index) {
            self.ram[index as usize] =
                self.write_frozen_only(Reg::Ram(index), self.ram[index as usize], value);
            return;
        }

        self.ram[index as usize] = value;

        let buffer = index / mailbox::WORDS_PER_BUFFER;
        let first_free = mailbox::first_free_buffer(
            ((self.ctrl2 & ctrl2::RFFN_MASK) >> ctrl2::RFFN_SHIFT) as u8,
        );

        if index % mailbox::WORDS_PER_BUFFER == word::CS
            && buffer >= first_free
            && codec::code_of(value) == Ok(Code::TxData)
        {
            self.pending_tx = Some((buffer, LATENCY));
        }
    }

    fn write_iflag1(&mut self, value: u32) {
        let cleared = self.iflag1 & value;
        self.iflag1 &= !value;

        if cleared & iflag::FIFO_AVAILABLE != 0 {
            self.fifo.pop_front();
            self.refresh_fifo();
        }
    }

    /// First filter element matching `frame`.
    fn accepts(&self, frame: &Frame) -> Option<u32> {
        let incoming = codec::filter_element(frame.standard_id());

        (0..self.filter_elements()).find_map(|n| {
            let element = self.ram[(FILTER_TABLE_WORD + n) as usize];
            let mask = if self.mcr & mcr::IRMQ != 0 && n < RXIMR_COUNT {
                self.rximr[n as usize]
            } else {
                self.rxfgmask
            };

            ((incoming ^ element) & mask == 0).then_some(n as u32)
        })
    }

    fn refresh_fifo(&mut self) {
        if let Some(&(frame, hit)) = self.fifo.front() {
            let [data0, data1] = frame.payload();
            let base = mailbox::ram_word(mailbox::FIFO_OUTPUT, 0) as usize;

            self.ram[base] = (u8::from(Code::RxFull) as u32) << 24 | codec::DLC_8 << 16;
            self.ram[base + 1] = codec::id_to_word(frame.standard_id());
            self.ram[base + 2] = data0;
            self.ram[base + 3] = data1;
            self.rxfir = hit;
            self.iflag1 |= iflag::FIFO_AVAILABLE;
        }
    }

    /// Takes frames other nodes sent since the last poll. A module that is
    /// not running misses them.
    fn pump(&mut self) {
        let bus = Rc::clone(&self.bus);
        let bus = bus.borrow();
        let start = self.cursor;
        self.cursor = bus.len();

        if self.mode != Mode::Running {
            return;
        }

        for (sender, frame) in bus[start..].iter() {
            if *sender == self.node {
                continue;
            }

            if let Some(hit) = self.accepts(frame) {
                if self.fifo.len() == FIFO_DEPTH {
                    self.iflag1 |= iflag::FIFO_OVERFLOW;
                } else {
                    self.fifo.push_back((*frame, hit));
                }
            }
        }

        if self.iflag1 & iflag::FIFO_AVAILABLE == 0 {
            self.refresh_fifo();
        }
    }

    fn is_pending_cs(&self, index: u8) -> bool {
        matches!(self.pending_tx, Some((buffer, _)) if mailbox::ram_word(buffer, word::CS) == index)
    }

    fn tick_tx(&mut self) {
        if self.mode != Mode::Running || self.stuck_on(Condition::TransmitComplete) {
            return;
        }

        match self.pending_tx {
            Some((buffer, 0)) => {
                let base = mailbox::ram_word(buffer, 0) as usize;
                let frame = Frame::from_parts(
                    codec::id_from_word(self.ram[base + word::ID as usize]),
                    [
                        self.ram[base + word::DATA0 as usize],
                        self.ram[base + word::DATA1 as usize],
                    ],
                );

                self.bus.borrow_mut().push((self.node, frame));
                self.ram[base] = codec::tx_descriptor(Code::TxInactive);
                self.iflag1 |= 1 << buffer;
                self.pending_tx = None;
            }
            Some((buffer, n)) => self.pending_tx = Some((buffer, n - 1)),
            None => {}
        }
    }
}

impl Registers for SimFlexCan {
    fn read(&mut self, reg: Reg) -> u32 {
        self.check_clock(reg);

        match reg {
            Reg::SoscCsr => {
                self.read_sosccsr();
            }
            Reg::Mcr => self.advance(),
            Reg::Iflag1 => {
                self.pump();
                self.tick_tx();
            }
            Reg::Timer => self.timer = self.timer.wrapping_add(1),
            Reg::Ram(index) if self.is_pending_cs(index) => self.tick_tx(),
            _ => {}
        }

        let value = self.raw(reg);
        self.log.push(Access::Read(reg, value));
        value
    }

    fn write(&mut self, reg: Reg, value: u32) {
        self.check_clock(reg);
        self.log.push(Access::Write(reg, value));

        match reg {
            Reg::SoscCsr => self.write_sosccsr(value),
            Reg::SoscDiv => self.soscdiv = value,
            Reg::SoscCfg => {
                if self.sosccsr & (scg::SOSCEN | scg::LK) != 0 {
                    self.violations.push(Violation::OscillatorLocked(reg));
                } else {
                    self.sosccfg = value;
                }
            }
            Reg::PccCan => self.pcc_can = value & pcc::CGC,
            Reg::PccPort(port) => self.pcc_port[u8::from(port) as usize] = value & pcc::CGC,
            Reg::Pcr(port, pin) => self.pcr[u8::from(port) as usize][pin as usize] = value,
            Reg::Mcr => self.write_mcr(value),
            Reg::Ctrl1 => self.write_ctrl1(value),
            Reg::Ctrl2 => self.ctrl2 = self.write_frozen_only(reg, self.ctrl2, value),
            Reg::RxMgMask => self.rxmgmask = self.write_frozen_only(reg, self.rxmgmask, value),
            Reg::RxFgMask => self.rxfgmask = self.write_frozen_only(reg, self.rxfgmask, value),
            Reg::RxImr(index) => {
                self.rximr[index as usize] =
                    self.write_frozen_only(reg, self.rximr[index as usize], value)
            }
            Reg::Imask1 => self.imask1 = value,
            Reg::Iflag1 => self.write_iflag1(value),
            Reg::Ram(index) => self.write_ram(index, value),
            Reg::Timer | Reg::RxFir => {}
        }
    }
}
