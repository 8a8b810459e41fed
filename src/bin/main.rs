//! Pixel engine demo
//! ========================================
//! needs to be run in WSL2 terminal
//! source ~/export-esp.sh
//! ========================================
//!
//! Clears the panel with solid fills, then bounces a sprite across the
//! screen edges through the DMA window path so clipping is exercised on
//! every side.

//% CHIPS: esp32s3
//% FEATURES: esp-hal/unstable

#![no_std]
#![no_main]

// Define the application description, which is placed in a special section of the binary.
// This is used by the bootloader to verify the application.
// The macro automatically fills in the fields.
esp_bootloader_esp_idf::esp_app_desc!();

use esp_backtrace as _;

use embedded_graphics::{
    pixelcolor::Rgb565,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
};
use esp_hal::{delay::Delay, main, time::Instant, Config as HalConfig};
use esp_println::println;

use tft_pixel_engine::{display::setup_display, wiring::init_board_pins, Config};

// Heap for the sprite and its staging buffer
extern crate alloc;
#[cfg(not(any(feature = "parallel8", feature = "rgb666")))]
use alloc::vec;

#[cfg(not(any(feature = "parallel8", feature = "rgb666")))]
const SPRITE: u32 = 64;

#[main]
fn main() -> ! {
    esp_println::logger::init_logger(log::LevelFilter::Info);

    // Initialize peripherals
    let peripherals = esp_hal::init(HalConfig::default());

    esp_alloc::heap_allocator!(size: 72 * 1024);

    let pins = init_board_pins(peripherals);
    let mut display = match setup_display(pins, Config::default()) {
        Ok(d) => d,
        Err(e) => panic!("display setup failed: {}", e),
    };
    let tft = &mut display.tft;
    let delay = Delay::new();

    println!("Panel {}x{} ready", tft.width(), tft.height());

    // Solid fills on the register path
    let t0 = Instant::now();
    let _ = tft.clear(Rgb565::BLACK);
    println!("Clear: {} us", t0.elapsed().as_micros());

    let band = tft.height() as u32 / 3;
    for (i, color) in [Rgb565::RED, Rgb565::GREEN, Rgb565::BLUE].into_iter().enumerate() {
        let _ = Rectangle::new(
            Point::new(0, (band * i as u32) as i32),
            Size::new(tft.width() as u32, band),
        )
        .into_styled(PrimitiveStyle::with_fill(color))
        .draw(tft);
    }
    delay.delay_millis(1000);

    #[cfg(not(any(feature = "parallel8", feature = "rgb666")))]
    {
        if !tft.init_dma() {
            println!("DMA was already running");
        }

        // Diagonal gradient sprite, stored as logical RGB565 values.
        let mut sprite = vec![0u16; (SPRITE * SPRITE) as usize];
        for (i, px) in sprite.iter_mut().enumerate() {
            let (x, y) = (i as u32 % SPRITE, i as u32 / SPRITE);
            let r = (x * 31 / SPRITE) as u16;
            let g = ((x + y) * 63 / (2 * SPRITE)) as u16;
            let b = (y * 31 / SPRITE) as u16;
            *px = r << 11 | g << 5 | b;
        }
        let mut staging = vec![0u16; sprite.len()];
        tft.set_swap_bytes(true);

        let (w, h) = (tft.width() as i32, tft.height() as i32);
        let (mut x, mut y) = (-(SPRITE as i32) / 2, h / 4);
        let (mut vx, mut vy) = (3i32, 2i32);

        loop {
            let t0 = Instant::now();
            match tft.push_image_dma(x, y, SPRITE, SPRITE, &sprite, &mut staging) {
                Ok(transfer) => {
                    // Move the sprite while the frame is on its way out.
                    x += vx;
                    y += vy;
                    transfer.wait();
                }
                Err(e) => println!("push_image_dma: {}", e),
            }
            log::debug!("frame: {} us", t0.elapsed().as_micros());

            // Let it run half off screen before turning back.
            if x < -(SPRITE as i32) / 2 || x > w - SPRITE as i32 / 2 {
                vx = -vx;
            }
            if y < -(SPRITE as i32) / 2 || y > h - SPRITE as i32 / 2 {
                vy = -vy;
            }
            delay.delay_millis(16);
        }
    }

    // The DMA window path carries RGB565 only.
    #[cfg(any(feature = "parallel8", feature = "rgb666"))]
    loop {
        delay.delay_millis(1000);
    }
}
