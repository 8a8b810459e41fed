// This module handles board-specific pin mappings.
// The bus profile is selected via Cargo features; both profiles share
// the backlight and reset lines so the firmware stays identical.
//! Serial profile (default):
//! - SCK  => GPIO10
//! - MOSI => GPIO11
//! - CS   => GPIO9
//! - DC   => GPIO8
//! - RST  => GPIO14
//! - BL   => GPIO2
//!
//! Parallel profile (`parallel8`):
//! - D0..D7 => GPIO4, 5, 6, 7, 15, 16, 17, 18
//! - WR => GPIO9, RD => GPIO10, DC => GPIO8, CS => GPIO11
//! - RST => GPIO14, BL => GPIO2
//!
//! The push engines write the first GPIO bank directly, so every line they
//! touch (DC, and the whole 8080 bus) must sit below GPIO32.

use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::peripherals::Peripherals;

#[cfg(not(feature = "parallel8"))]
use esp_hal::peripherals::{DMA_CH0, GPIO10, GPIO11, SPI2};

/// GPIO number of the DC line, driven from the register path.
pub const LCD_DC_GPIO: u8 = 8;

#[cfg(feature = "parallel8")]
pub const LCD_DATA_GPIO: [u8; 8] = [4, 5, 6, 7, 15, 16, 17, 18];
#[cfg(feature = "parallel8")]
pub const LCD_WR_GPIO: u8 = 9;
#[cfg(feature = "parallel8")]
pub const LCD_RD_GPIO: u8 = 10;

#[cfg(not(feature = "parallel8"))]
pub struct DisplayPins<'a> {
    pub spi2: SPI2<'a>,
    pub spi_sck: GPIO10<'a>,
    pub spi_mosi: GPIO11<'a>,
    pub dma_ch0: DMA_CH0<'a>,
    pub lcd_cs: Output<'a>,
    pub lcd_dc: Output<'a>,
    pub lcd_rst: Output<'a>,
    pub lcd_bl: Output<'a>,
}

#[cfg(feature = "parallel8")]
pub struct DisplayPins<'a> {
    /// D0..D7, in `LCD_DATA_GPIO` order.
    pub lcd_data: [Output<'a>; 8],
    pub lcd_wr: Output<'a>,
    pub lcd_rd: Output<'a>,
    pub lcd_dc: Output<'a>,
    pub lcd_cs: Output<'a>,
    pub lcd_rst: Output<'a>,
    pub lcd_bl: Output<'a>,
}

fn out<'a>(pin: impl esp_hal::gpio::OutputPin + 'a, level: Level) -> Output<'a> {
    Output::new(pin, level, OutputConfig::default())
}

// Serial profile
#[cfg(not(feature = "parallel8"))]
pub fn init_board_pins<'a>(p: Peripherals) -> DisplayPins<'a> {
    // LCD control pins, do NOT touch GPIO10/11 here (SPI SCK/MOSI)
    DisplayPins {
        lcd_cs: out(p.GPIO9, Level::High),
        lcd_dc: out(p.GPIO8, Level::High),
        lcd_rst: out(p.GPIO14, Level::High),
        lcd_bl: out(p.GPIO2, Level::Low),
        spi2: p.SPI2,
        spi_sck: p.GPIO10,
        spi_mosi: p.GPIO11,
        dma_ch0: p.DMA_CH0,
    }
}

// Parallel profile (enable with --features parallel8)
#[cfg(feature = "parallel8")]
pub fn init_board_pins<'a>(p: Peripherals) -> DisplayPins<'a> {
    DisplayPins {
        lcd_data: [
            out(p.GPIO4, Level::Low),
            out(p.GPIO5, Level::Low),
            out(p.GPIO6, Level::Low),
            out(p.GPIO7, Level::Low),
            out(p.GPIO15, Level::Low),
            out(p.GPIO16, Level::Low),
            out(p.GPIO17, Level::Low),
            out(p.GPIO18, Level::Low),
        ],
        // WR, RD, DC idle high
        lcd_wr: out(p.GPIO9, Level::High),
        lcd_rd: out(p.GPIO10, Level::High),
        lcd_dc: out(p.GPIO8, Level::High),
        lcd_cs: out(p.GPIO11, Level::High),
        lcd_rst: out(p.GPIO14, Level::High),
        lcd_bl: out(p.GPIO2, Level::Low),
    }
}
