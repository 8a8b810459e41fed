//! Display setup and initialization module.
//
// - `setup_display` picks the bus backend based on features.
// - Serial path: SPI2 with a DMA channel. Register pushes and DMA
//   transactions share the bus, CS stays low for the whole session.
//   With `rgb666` the DMA channel stays unused.
// - Parallel path: 8080 bus on GPIO bank 0, no DMA.
// - `rgb666` switches the pixel format for ILI9488 class panels.

use esp_backtrace as _;

use embedded_hal::delay::DelayNs;
use esp_hal::gpio::Output;

use crate::cmd::Cmd;
use crate::config::{Config, ConfigError};
use crate::push::PushStrategy;
use crate::tft::Tft;
use crate::wiring::DisplayPins;

cfg_if::cfg_if! {
    if #[cfg(feature = "rgb666")] {
        pub type Format = crate::color::Rgb666Format;
        const COLMOD_PARAM: u8 = 0x66;
    } else {
        pub type Format = crate::color::Rgb565Format;
        const COLMOD_PARAM: u8 = 0x55;
    }
}

// A tiny busy-wait delay that satisfies embedded-hal 1.0 DelayNs.
struct SpinDelay;

impl DelayNs for SpinDelay {
    #[inline]
    fn delay_ns(&mut self, ns: u32) {
        let mut n = ns / 50 + 1;
        while n != 0 {
            core::hint::spin_loop();
            n -= 1;
        }
    }
    #[inline]
    fn delay_us(&mut self, us: u32) {
        for _ in 0..us {
            self.delay_ns(1_000);
        }
    }
    #[inline]
    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1_000);
        }
    }
}

fn reset_panel(rst: &mut Output<'_>, delay: &mut impl DelayNs) {
    rst.set_low();
    delay.delay_ms(10);
    rst.set_high();
    delay.delay_ms(120);
}

// Just enough to get pixels on screen: reset, wake, pixel format, on.
fn init_controller<S: PushStrategy>(s: &mut S, delay: &mut impl DelayNs) -> Result<(), S::Error> {
    s.write_command(Cmd::SWRESET)?;
    delay.delay_ms(150);
    s.write_command(Cmd::SLPOUT)?;
    delay.delay_ms(120);
    s.write_command(Cmd::COLMOD)?;
    s.write_data(&[COLMOD_PARAM])?;
    s.write_command(Cmd::DISPON)?;
    delay.delay_ms(20);
    Ok(())
}

// ==================================================================
// SPI backend (default)
// ==================================================================
#[cfg(not(feature = "parallel8"))]
mod serial_backend {
    use super::*;

    use esp_hal::spi::master::{Config as SpiConfig, Spi};
    use esp_hal::spi::Mode;
    use esp_hal::time::Rate;

    use crate::config::SpiMode;
    use crate::push::SpiPush;
    use crate::regs::{RawOutput, Spi2Registers};
    use crate::wiring::LCD_DC_GPIO;

    cfg_if::cfg_if! {
        if #[cfg(feature = "rgb666")] {
            use esp_hal::Blocking;

            // 24-bit pixels have no DMA path, the register engine does it all.
            pub type DisplayType = Tft<SpiPush<Spi2Registers, RawOutput, Format>>;

            // Keeps SPI2 configured and DC owned for the register engine.
            pub struct BusLink<'a> {
                _spi: Spi<'a, Blocking>,
                _dc: Output<'a>,
            }

            fn attach_bus<'a>(
                tft: Tft<SpiPush<Spi2Registers, RawOutput, Format>>,
                spi: Spi<'a, Blocking>,
                _dma_ch0: esp_hal::peripherals::DMA_CH0<'a>,
                lcd_dc: Output<'a>,
            ) -> (DisplayType, BusLink<'a>) {
                (tft, BusLink { _spi: spi, _dc: lcd_dc })
            }
        } else {
            use core::convert::Infallible;

            use embedded_hal::digital::{ErrorType, OutputPin};
            use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
            use esp_hal::dma::{DmaRxBuf, DmaTxBuf};
            use esp_hal::dma_buffers;
            use esp_hal::spi::master::SpiDmaBus;
            use esp_hal::Blocking;

            use crate::spi_host::SpiDeviceHost;

            // 32736 = 32 * 1023
            const DMA_CHUNK: usize = 32 * 1023;

            /// Chip select handed to the SPI device. The real line is held low.
            pub struct HeldLow;

            impl ErrorType for HeldLow {
                type Error = Infallible;
            }

            impl OutputPin for HeldLow {
                fn set_low(&mut self) -> Result<(), Infallible> {
                    Ok(())
                }
                fn set_high(&mut self) -> Result<(), Infallible> {
                    Ok(())
                }
            }

            pub type SpiDev<'a> = ExclusiveDevice<SpiDmaBus<'a, Blocking>, HeldLow, NoDelay>;

            pub type DisplayType<'a> = Tft<
                SpiPush<Spi2Registers, RawOutput, Format>,
                SpiDeviceHost<SpiDev<'a>, Output<'a>>,
            >;

            fn attach_bus<'a>(
                tft: Tft<SpiPush<Spi2Registers, RawOutput, Format>>,
                spi: Spi<'a, Blocking>,
                dma_ch0: esp_hal::peripherals::DMA_CH0<'a>,
                lcd_dc: Output<'a>,
            ) -> DisplayType<'a> {
                let (rx_buf, rx_desc, tx_buf, tx_desc) = dma_buffers!(32, DMA_CHUNK);
                let rx = DmaRxBuf::new(rx_desc, rx_buf).unwrap();
                let tx = DmaTxBuf::new(tx_desc, tx_buf).unwrap();

                let spi_bus: SpiDmaBus<'a, Blocking> =
                    spi.with_dma(dma_ch0).with_buffers(rx, tx);
                let spi_dev =
                    ExclusiveDevice::new(spi_bus, HeldLow, NoDelay).unwrap_or_else(|e| match e {});

                tft.with_dma(SpiDeviceHost::new(spi_dev, lcd_dc))
            }
        }
    }

    pub struct Display<'a> {
        #[cfg(feature = "rgb666")]
        pub tft: DisplayType,
        #[cfg(not(feature = "rgb666"))]
        pub tft: DisplayType<'a>,
        #[cfg(feature = "rgb666")]
        _link: BusLink<'a>,
        _cs: Output<'a>,
        _rst: Output<'a>,
        _bl: Output<'a>,
    }

    pub fn setup_display<'a>(
        display_pins: DisplayPins<'a>,
        config: Config,
    ) -> Result<Display<'a>, ConfigError> {
        config.validate()?;

        let DisplayPins {
            spi2,
            spi_sck,
            spi_mosi,
            dma_ch0,
            mut lcd_cs,
            lcd_dc,
            mut lcd_rst,
            mut lcd_bl,
        } = display_pins;

        let mut delay = SpinDelay;
        reset_panel(&mut lcd_rst, &mut delay);

        let mode = match config.spi_mode {
            SpiMode::Mode0 => Mode::_0,
            SpiMode::Mode1 => Mode::_1,
            SpiMode::Mode2 => Mode::_2,
            SpiMode::Mode3 => Mode::_3,
        };
        let spi = Spi::new(
            spi2,
            SpiConfig::default()
                .with_frequency(Rate::from_hz(config.frequency_hz))
                .with_mode(mode),
        )
        .unwrap()
        .with_sck(spi_sck)
        .with_mosi(spi_mosi);

        lcd_cs.set_low();

        // SAFETY: SPI2 is configured above and DC (GPIO8) is an output. A DMA
        // transfer holds the `Tft` borrowed until it has drained, so register
        // pushes never overlap one.
        let regs = unsafe { Spi2Registers::new() };
        let dc = unsafe { RawOutput::new(LCD_DC_GPIO) };

        let mut plain = Tft::new(SpiPush::new(regs, dc), config)?;
        init_controller(plain.strategy_mut(), &mut delay).unwrap_or_else(|e| match e {});
        #[cfg(feature = "rgb666")]
        let (tft, link) = attach_bus(plain, spi, dma_ch0, lcd_dc);
        #[cfg(not(feature = "rgb666"))]
        let tft = attach_bus(plain, spi, dma_ch0, lcd_dc);

        lcd_bl.set_high();

        Ok(Display {
            tft,
            #[cfg(feature = "rgb666")]
            _link: link,
            _cs: lcd_cs,
            _rst: lcd_rst,
            _bl: lcd_bl,
        })
    }
}

// ==================================================================
// 8-bit parallel backend (feature: parallel8)
// ==================================================================
#[cfg(feature = "parallel8")]
mod parallel_backend {
    use super::*;

    use crate::config::ParallelPins;
    use crate::push::ParallelPush;
    use crate::regs::GpioParallel;
    use crate::wiring::{LCD_DATA_GPIO, LCD_DC_GPIO, LCD_RD_GPIO, LCD_WR_GPIO};

    pub type DisplayType = Tft<ParallelPush<GpioParallel, Format>>;

    pub struct Display<'a> {
        pub tft: DisplayType,
        // The engine drives these through the GPIO registers.
        _bus: [Output<'a>; 8],
        _wr: Output<'a>,
        _rd: Output<'a>,
        _dc: Output<'a>,
        _cs: Output<'a>,
        _rst: Output<'a>,
        _bl: Output<'a>,
    }

    pub fn setup_display<'a>(
        display_pins: DisplayPins<'a>,
        config: Config,
    ) -> Result<Display<'a>, ConfigError> {
        let DisplayPins {
            lcd_data,
            lcd_wr,
            lcd_rd,
            lcd_dc,
            mut lcd_cs,
            mut lcd_rst,
            mut lcd_bl,
        } = display_pins;

        let pins = ParallelPins::new(LCD_DATA_GPIO, LCD_WR_GPIO, LCD_RD_GPIO, LCD_DC_GPIO)?;

        let mut delay = SpinDelay;
        reset_panel(&mut lcd_rst, &mut delay);
        lcd_cs.set_low();

        // SAFETY: every pin in `pins` was configured as an output in wiring.rs
        // and stays owned by the returned `Display`.
        let bus = unsafe { GpioParallel::new() };
        let mut tft: DisplayType = Tft::new(ParallelPush::new(bus, pins), config)?;
        init_controller(tft.strategy_mut(), &mut delay).unwrap_or_else(|e| match e {});

        lcd_bl.set_high();

        Ok(Display {
            tft,
            _bus: lcd_data,
            _wr: lcd_wr,
            _rd: lcd_rd,
            _dc: lcd_dc,
            _cs: lcd_cs,
            _rst: lcd_rst,
            _bl: lcd_bl,
        })
    }
}

#[cfg(not(feature = "parallel8"))]
pub use serial_backend::{setup_display, Display, DisplayType};

#[cfg(feature = "parallel8")]
pub use parallel_backend::{setup_display, Display, DisplayType};
