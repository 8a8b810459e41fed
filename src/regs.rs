//! ESP32-S3 register access behind the bus traits.
//
// These bypass the esp-hal drivers on purpose: the push loops need to touch
// W0..W15 and the GPIO set/clear registers with nothing in between. The
// peripherals must already be configured (pins muxed, clocks running) by the
// regular drivers in `display.rs`.

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};
use esp_hal::peripherals::{GPIO, SPI2};

use crate::bus::{Level, ParallelBus, PinMode, SpiRegisters};

/// CPU-buffer access to SPI2 (FSPI).
pub struct Spi2Registers {
    _private: (),
}

impl Spi2Registers {
    /// # Safety
    ///
    /// SPI2 must already be set up as a master with SCK and MOSI routed.
    /// Transfers issued through this handle race with anything else driving
    /// SPI2, so the caller must not interleave them with an in-flight DMA
    /// transaction.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl SpiRegisters for Spi2Registers {
    #[inline(always)]
    fn load_register(&mut self, index: usize, word: u32) {
        SPI2::regs().w(index).write(|w| unsafe { w.bits(word) });
    }

    #[inline(always)]
    fn set_bit_length(&mut self, bits_minus_one: u32) {
        SPI2::regs()
            .ms_dlen()
            .write(|w| unsafe { w.ms_data_bitlen().bits(bits_minus_one) });
    }

    #[inline(always)]
    fn start_transfer(&mut self) {
        let regs = SPI2::regs();
        // Latch the new length into the SPI clock domain first.
        regs.cmd().modify(|_, w| w.update().set_bit());
        while regs.cmd().read().update().bit_is_set() {}
        regs.cmd().modify(|_, w| w.usr().set_bit());
    }

    #[inline(always)]
    fn transfer_busy(&self) -> bool {
        SPI2::regs().cmd().read().usr().bit_is_set()
    }

    fn begin_write(&mut self) {
        self.wait_idle();
        let regs = SPI2::regs();
        regs.dma_conf().modify(|_, w| w.dma_tx_ena().clear_bit());
        regs.user()
            .modify(|_, w| w.usr_mosi().set_bit().usr_miso().clear_bit());
    }
}

/// The first GPIO bank (GPIO0..GPIO31) driven through its W1TS/W1TC registers.
pub struct GpioParallel {
    _private: (),
}

impl GpioParallel {
    /// # Safety
    ///
    /// All pins handed to the push engine must be configured as GPIO outputs
    /// and not be owned by any other driver.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl ParallelBus for GpioParallel {
    fn set_pin_direction(&mut self, pin: u8, mode: PinMode) {
        let mask = 1u32 << pin;
        match mode {
            PinMode::Output => GPIO::regs().enable_w1ts().write(|w| unsafe { w.bits(mask) }),
            PinMode::Input => GPIO::regs().enable_w1tc().write(|w| unsafe { w.bits(mask) }),
        };
    }

    #[inline(always)]
    fn write_control_line(&mut self, pin: u8, level: Level) {
        let mask = 1u32 << pin;
        match level {
            Level::High => GPIO::regs().out_w1ts().write(|w| unsafe { w.bits(mask) }),
            Level::Low => GPIO::regs().out_w1tc().write(|w| unsafe { w.bits(mask) }),
        };
    }

    #[inline(always)]
    fn read_input_port(&mut self) -> u32 {
        GPIO::regs().in_().read().bits()
    }

    #[inline(always)]
    fn write_output_masks(&mut self, set: u32, clear: u32) {
        let regs = GPIO::regs();
        regs.out_w1tc().write(|w| unsafe { w.bits(clear) });
        regs.out_w1ts().write(|w| unsafe { w.bits(set) });
    }
}

/// A bank-0 output written through W1TS/W1TC.
///
/// Lets the register push path drive a line (DC) whose esp-hal `Output` is
/// owned by the DMA host. Both only ever run from the same thread.
pub struct RawOutput {
    mask: u32,
}

impl RawOutput {
    /// # Safety
    ///
    /// `pin` must be below 32 and already configured as a GPIO output.
    pub unsafe fn new(pin: u8) -> Self {
        Self { mask: 1 << pin }
    }
}

impl ErrorType for RawOutput {
    type Error = Infallible;
}

impl OutputPin for RawOutput {
    #[inline(always)]
    fn set_low(&mut self) -> Result<(), Self::Error> {
        GPIO::regs().out_w1tc().write(|w| unsafe { w.bits(self.mask) });
        Ok(())
    }

    #[inline(always)]
    fn set_high(&mut self) -> Result<(), Self::Error> {
        GPIO::regs().out_w1ts().write(|w| unsafe { w.bits(self.mask) });
        Ok(())
    }
}
