//! System oscillator bring-up and clock gating for the CAN module and its pins.

use crate::{
    regs::{pcc, port, scg},
    Condition, Config, Pins, Reg, Registers, Timeout,
};

/// Starts the external crystal oscillator that feeds the controller's
/// asynchronous clock, then gates the CAN module's bus clock.
///
/// `SOSCCSR` is lock protected and `SOSCCFG` only accepts writes while the
/// oscillator is off, hence the unlock, disable, configure, enable, lock order.
pub(crate) fn start_oscillator<R: Registers>(regs: &mut R, config: &Config) -> Result<(), Timeout> {
    regs.modify(Reg::SoscCsr, |csr| csr & !scg::LK);
    regs.modify(Reg::SoscCsr, |csr| csr & !scg::SOSCEN);

    let range = (u8::from(config.oscillator_range) as u32) << scg::RANGE_SHIFT;
    regs.write(Reg::SoscCfg, scg::EREFS | (range & scg::RANGE_MASK));

    regs.modify(Reg::SoscCsr, |csr| csr | scg::SOSCEN);
    regs.write(
        Reg::SoscDiv,
        (scg::DIV_BY_1 << scg::DIV1_SHIFT) | (scg::DIV_BY_1 << scg::DIV2_SHIFT),
    );
    regs.modify(Reg::SoscCsr, |csr| csr | scg::LK);

    config.wait.wait_until(Condition::OscillatorValid, || {
        regs.read(Reg::SoscCsr) & scg::SOSCVLD != 0
    })?;
    debug!("system oscillator valid");

    regs.modify(Reg::PccCan, |gate| gate | pcc::CGC);

    Ok(())
}

/// Hands the RX and TX pins to the controller. The port clock is gated first,
/// its pin control registers fault otherwise.
pub(crate) fn route_pins<R: Registers>(regs: &mut R, pins: &Pins) {
    regs.modify(Reg::PccPort(pins.port), |gate| gate | pcc::CGC);

    for pin in [pins.rx, pins.tx] {
        regs.modify(Reg::Pcr(pins.port, pin), |pcr| {
            (pcr & !port::MUX_MASK) | port::mux(pins.mux)
        });
    }

    debug!(
        "CAN pins routed: port {:?} rx {} tx {} alt {}",
        pins.port, pins.rx, pins.tx, pins.mux
    );
}
