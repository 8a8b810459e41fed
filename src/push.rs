//! Synchronous pixel push.
//!
//! One strategy per (bus, pixel format) pair, chosen by type at build time so
//! the hot loops never branch on configuration:
//!
//! | strategy                              | bus            | format |
//! |---------------------------------------|----------------|--------|
//! | `SpiPush<R, DC, Rgb565Format>`        | SPI            | RGB565 |
//! | `SpiPush<R, DC, Rgb666Format>`        | SPI            | RGB666 |
//! | `SpiStrobePush<R, DC, WR>`            | SPI + WR latch | RGB565 |
//! | `ParallelPush<P, F>`                  | 8080 8bit      | either |
//!
//! The byte-swap flag is resolved once per call: each stream loop is
//! monomorphised for one byte order.
//!
//! Every call blocks until the last byte has left the bus.

use core::convert::Infallible;
use core::fmt;
use core::marker::PhantomData;

use embedded_hal::digital::OutputPin;

use crate::bus::{Level, ParallelBus, PinMode, SpiRegisters, FIFO_WORDS};
use crate::cmd::Cmd;
use crate::color::{
    encode_rgb666, pack_rgb565_fill, pack_rgb565_pair, wire_color, BusMode, PixelFormat,
    Rgb565Format, Rgb666Block, Rgb666Format,
};
use crate::config::ParallelPins;
use crate::window::address_range;

/// Common contract of all push strategies.
pub trait PushStrategy {
    type Error: fmt::Debug;

    /// Pixel encoding the controller was configured for.
    type Format: PixelFormat;

    const BUS: BusMode;

    /// Write `len` copies of the logical colour `color`.
    fn push_block(&mut self, color: u16, len: u32);

    /// Stream stored pixels, swapping bytes when `swap` is set.
    fn push_pixels(&mut self, data: &[u16], swap: bool);

    /// Stream stored pixels with swapped bytes whatever the ambient flag says.
    fn push_swap_byte_pixels(&mut self, data: &[u16]) {
        self.push_pixels(data, true);
    }

    /// Send one command byte with DC low.
    fn write_command(&mut self, cmd: u8) -> Result<(), Self::Error>;

    /// Send parameter bytes with DC high.
    fn write_data(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Open an inclusive address window and start a memory write.
    fn set_window(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) -> Result<(), Self::Error> {
        self.write_command(Cmd::CASET)?;
        self.write_data(&address_range(x0, x1))?;
        self.write_command(Cmd::PASET)?;
        self.write_data(&address_range(y0, y1))?;
        self.write_command(Cmd::RAMWR)
    }
}

/// Strategies whose controller takes the DMA payload as is: SPI attached and
/// 16 bits per pixel.
///
/// ```
/// # use core::convert::Infallible;
/// # use embedded_hal::digital::{ErrorType, OutputPin};
/// # use tft_pixel_engine::bus::SpiRegisters;
/// # struct Regs;
/// # impl SpiRegisters for Regs {
/// #     fn load_register(&mut self, _: usize, _: u32) {}
/// #     fn set_bit_length(&mut self, _: u32) {}
/// #     fn start_transfer(&mut self) {}
/// #     fn transfer_busy(&self) -> bool { false }
/// # }
/// # struct Pin;
/// # impl ErrorType for Pin { type Error = Infallible; }
/// # impl OutputPin for Pin {
/// #     fn set_low(&mut self) -> Result<(), Infallible> { Ok(()) }
/// #     fn set_high(&mut self) -> Result<(), Infallible> { Ok(()) }
/// # }
/// use tft_pixel_engine::{DmaCapable, Rgb565Format, SpiPush};
///
/// fn takes_dma<S: DmaCapable>(_: S) {}
/// takes_dma(SpiPush::<_, _, Rgb565Format>::new(Regs, Pin));
/// ```
///
/// An RGB666 panel needs three bytes per pixel, so it cannot take a host:
///
/// ```compile_fail
/// # use core::convert::Infallible;
/// # use embedded_hal::digital::{ErrorType, OutputPin};
/// # use tft_pixel_engine::bus::SpiRegisters;
/// # struct Regs;
/// # impl SpiRegisters for Regs {
/// #     fn load_register(&mut self, _: usize, _: u32) {}
/// #     fn set_bit_length(&mut self, _: u32) {}
/// #     fn start_transfer(&mut self) {}
/// #     fn transfer_busy(&self) -> bool { false }
/// # }
/// # struct Pin;
/// # impl ErrorType for Pin { type Error = Infallible; }
/// # impl OutputPin for Pin {
/// #     fn set_low(&mut self) -> Result<(), Infallible> { Ok(()) }
/// #     fn set_high(&mut self) -> Result<(), Infallible> { Ok(()) }
/// # }
/// use tft_pixel_engine::{DmaCapable, Rgb666Format, SpiPush};
///
/// fn takes_dma<S: DmaCapable>(_: S) {}
/// takes_dma(SpiPush::<_, _, Rgb666Format>::new(Regs, Pin));
/// ```
pub trait DmaCapable: PushStrategy<Format = Rgb565Format> {}

// ---------------------------------------------------------------------------
// SPI register path
// ---------------------------------------------------------------------------

/// Pushes pixels straight into the SPI data registers.
pub struct SpiPush<R, DC, F> {
    regs: R,
    dc: DC,
    _format: PhantomData<F>,
}

impl<R, DC, F> SpiPush<R, DC, F>
where
    R: SpiRegisters,
    DC: OutputPin,
{
    pub fn new(regs: R, dc: DC) -> Self {
        Self {
            regs,
            dc,
            _format: PhantomData,
        }
    }

    pub fn release(self) -> (R, DC) {
        (self.regs, self.dc)
    }

    /// Move `len` units through the FIFO, at most `batch` per transfer.
    ///
    /// `fill` populates the words of one batch. The next batch is prepared
    /// while the previous one is still on the wire and only loaded once the
    /// busy flag drops.
    fn transmit(
        &mut self,
        len: usize,
        batch: usize,
        bits_per_unit: u32,
        mut fill: impl FnMut(&mut [u32]),
    ) {
        if len == 0 {
            return;
        }
        let mut words = [0u32; FIFO_WORDS];
        let mut programmed: Option<u32> = None;
        let mut remaining = len;

        self.regs.begin_write();
        while remaining > 0 {
            let units = remaining.min(batch);
            let bits = units as u32 * bits_per_unit;
            let count = bits.div_ceil(32) as usize;
            fill(&mut words[..count]);

            self.regs.wait_idle();
            if programmed != Some(bits - 1) {
                self.regs.set_bit_length(bits - 1);
                programmed = Some(bits - 1);
            }
            for (index, word) in words[..count].iter().enumerate() {
                self.regs.load_register(index, *word);
            }
            self.regs.start_transfer();
            remaining -= units;
        }
        self.regs.wait_idle();
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        let mut chunks = bytes.chunks(FIFO_WORDS * 4);
        self.transmit(bytes.len(), FIFO_WORDS * 4, 8, |words| {
            let chunk = chunks.next().unwrap_or(&[]);
            for (word, quad) in words.iter_mut().zip(chunk.chunks(4)) {
                let mut le = [0u8; 4];
                le[..quad.len()].copy_from_slice(quad);
                *word = u32::from_le_bytes(le);
            }
        });
    }

    fn command(&mut self, cmd: u8) -> Result<(), DC::Error> {
        self.dc.set_low()?;
        self.write_bytes(&[cmd]);
        self.dc.set_high()
    }
}

impl<R, DC> SpiPush<R, DC, Rgb565Format>
where
    R: SpiRegisters,
    DC: OutputPin,
{
    fn stream_rgb565<const SWAP: bool>(&mut self, data: &[u16]) {
        let mut pairs = data.chunks(2);
        self.transmit(data.len(), Rgb565Format::FORMAT.batch_pixels(), 16, |words| {
            for word in words.iter_mut() {
                *word = match pairs.next() {
                    Some(&[a, b]) => pack_rgb565_pair(a, b, SWAP),
                    Some(&[a]) => pack_rgb565_pair(a, 0, SWAP),
                    _ => 0,
                };
            }
        });
    }
}

impl<R, DC> PushStrategy for SpiPush<R, DC, Rgb565Format>
where
    R: SpiRegisters,
    DC: OutputPin,
{
    type Error = DC::Error;
    type Format = Rgb565Format;

    const BUS: BusMode = BusMode::Serial;

    fn push_block(&mut self, color: u16, len: u32) {
        let word = pack_rgb565_fill(color);
        self.transmit(len as usize, Rgb565Format::FORMAT.batch_pixels(), 16, |words| {
            words.fill(word)
        });
    }

    fn push_pixels(&mut self, data: &[u16], swap: bool) {
        if swap {
            self.stream_rgb565::<true>(data);
        } else {
            self.stream_rgb565::<false>(data);
        }
    }

    fn write_command(&mut self, cmd: u8) -> Result<(), Self::Error> {
        self.command(cmd)
    }

    fn write_data(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.write_bytes(data);
        Ok(())
    }
}

impl<R, DC> DmaCapable for SpiPush<R, DC, Rgb565Format>
where
    R: SpiRegisters,
    DC: OutputPin,
{
}

impl<R, DC> SpiPush<R, DC, Rgb666Format>
where
    R: SpiRegisters,
    DC: OutputPin,
{
    // No word sharing for mixed colours: one 24-bit transfer per pixel.
    fn stream_rgb666<const SWAP: bool>(&mut self, data: &[u16]) {
        let mut pixels = data.iter();
        self.transmit(data.len(), 1, 24, |words| {
            let color = pixels.next().map_or(0, |&p| wire_color(p, SWAP));
            let [r, g, b] = encode_rgb666(color);
            words[0] = u32::from_le_bytes([r, g, b, 0]);
        });
    }
}

impl<R, DC> PushStrategy for SpiPush<R, DC, Rgb666Format>
where
    R: SpiRegisters,
    DC: OutputPin,
{
    type Error = DC::Error;
    type Format = Rgb666Format;

    const BUS: BusMode = BusMode::Serial;

    fn push_block(&mut self, color: u16, len: u32) {
        let block = Rgb666Block::new(color);
        self.transmit(len as usize, Rgb666Format::FORMAT.batch_pixels(), 24, |words| {
            for (i, word) in words.iter_mut().enumerate() {
                *word = block.word(i);
            }
        });
    }

    fn push_pixels(&mut self, data: &[u16], swap: bool) {
        if swap {
            self.stream_rgb666::<true>(data);
        } else {
            self.stream_rgb666::<false>(data);
        }
    }

    fn write_command(&mut self, cmd: u8) -> Result<(), Self::Error> {
        self.command(cmd)
    }

    fn write_data(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.write_bytes(data);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SPI with a write latch
// ---------------------------------------------------------------------------

/// SPI panels behind a shift-register front end (the RPi style boards) that
/// latch every 16 bits on a separate WR line.
///
/// A solid fill shifts the colour in once and then only pulses WR, one pulse
/// per further pixel.
pub struct SpiStrobePush<R, DC, WR> {
    spi: SpiPush<R, DC, Rgb565Format>,
    wr: WR,
}

impl<R, DC, WR> SpiStrobePush<R, DC, WR>
where
    R: SpiRegisters,
    DC: OutputPin,
    WR: OutputPin<Error = Infallible>,
{
    /// WR must idle high.
    pub fn new(regs: R, dc: DC, wr: WR) -> Self {
        Self {
            spi: SpiPush::new(regs, dc),
            wr,
        }
    }

    pub fn release(self) -> (R, DC, WR) {
        let (regs, dc) = self.spi.release();
        (regs, dc, self.wr)
    }
}

impl<R, DC, WR> PushStrategy for SpiStrobePush<R, DC, WR>
where
    R: SpiRegisters,
    DC: OutputPin,
    WR: OutputPin<Error = Infallible>,
{
    type Error = DC::Error;
    type Format = Rgb565Format;

    const BUS: BusMode = BusMode::Serial;

    fn push_block(&mut self, color: u16, len: u32) {
        if len == 0 {
            return;
        }
        self.spi.push_block(color, 1);
        for _ in 1..len {
            self.wr.set_low().unwrap_or_else(|e| match e {});
            self.wr.set_high().unwrap_or_else(|e| match e {});
        }
    }

    fn push_pixels(&mut self, data: &[u16], swap: bool) {
        self.spi.push_pixels(data, swap);
    }

    fn write_command(&mut self, cmd: u8) -> Result<(), Self::Error> {
        self.spi.write_command(cmd)
    }

    fn write_data(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.spi.write_data(data)
    }
}

// ---------------------------------------------------------------------------
// 8-bit parallel path
// ---------------------------------------------------------------------------

/// Pushes pixels over an 8080-style 8-bit bus by toggling GPIOs directly.
pub struct ParallelPush<P, F> {
    bus: P,
    pins: ParallelPins,
    _format: PhantomData<F>,
}

impl<P, F> ParallelPush<P, F>
where
    P: ParallelBus,
{
    /// Takes over a bus whose pins are already muxed as GPIO outputs.
    /// Leaves WR, RD and DC idle high.
    pub fn new(mut bus: P, pins: ParallelPins) -> Self {
        bus.write_control_line(pins.wr, Level::High);
        bus.write_control_line(pins.rd, Level::High);
        bus.write_control_line(pins.dc, Level::High);
        Self {
            bus,
            pins,
            _format: PhantomData,
        }
    }

    pub fn release(self) -> (P, ParallelPins) {
        (self.bus, self.pins)
    }

    /// Switch D0..D7 between driving the bus and reading it back.
    pub fn set_bus_direction(&mut self, mode: PinMode) {
        for &pin in self.pins.data.iter() {
            self.bus.set_pin_direction(pin, mode);
        }
    }

    /// Clock one byte in from the controller.
    ///
    /// D0..D7 must already be inputs, see [`set_bus_direction`](Self::set_bus_direction).
    pub fn read_byte(&mut self) -> u8 {
        self.bus.write_control_line(self.pins.rd, Level::Low);
        // Sample three times to cover the controller's access time; the last
        // read is the stable one.
        self.bus.read_input_port();
        self.bus.read_input_port();
        let port = self.bus.read_input_port();
        self.bus.write_control_line(self.pins.rd, Level::High);
        self.pins.gather(port)
    }

    /// Latch `byte` with WR low, then raise WR.
    #[inline]
    fn write_byte(&mut self, byte: u8) {
        let (set, clear) = self.pins.data_masks(byte);
        self.bus.write_output_masks(set, clear | 1 << self.pins.wr);
        self.bus.write_control_line(self.pins.wr, Level::High);
    }

    /// Clock the byte already on D0..D7 again.
    #[inline]
    fn strobe(&mut self) {
        self.bus.write_control_line(self.pins.wr, Level::Low);
        self.bus.write_control_line(self.pins.wr, Level::High);
    }
}

impl<P, F> ParallelPush<P, F>
where
    P: ParallelBus,
    F: PixelFormat,
{
    fn stream<const SWAP: bool>(&mut self, data: &[u16]) {
        for &px in data {
            for &b in F::encode(wire_color(px, SWAP)).as_ref() {
                self.write_byte(b);
            }
        }
    }
}

impl<P, F> PushStrategy for ParallelPush<P, F>
where
    P: ParallelBus,
    F: PixelFormat,
{
    type Error = Infallible;
    type Format = F;

    const BUS: BusMode = BusMode::Parallel8;

    fn push_block(&mut self, color: u16, len: u32) {
        if len == 0 {
            return;
        }
        let encoded = F::encode(color);
        let bytes = encoded.as_ref();

        if bytes.iter().all(|&b| b == bytes[0]) {
            // Data lines already hold the right value, only clock them.
            for &b in bytes {
                self.write_byte(b);
            }
            for _ in 1..len {
                for _ in bytes {
                    self.strobe();
                }
            }
        } else {
            for _ in 0..len {
                for &b in bytes {
                    self.write_byte(b);
                }
            }
        }
    }

    fn push_pixels(&mut self, data: &[u16], swap: bool) {
        if swap {
            self.stream::<true>(data);
        } else {
            self.stream::<false>(data);
        }
    }

    fn write_command(&mut self, cmd: u8) -> Result<(), Self::Error> {
        self.bus.write_control_line(self.pins.dc, Level::Low);
        self.write_byte(cmd);
        self.bus.write_control_line(self.pins.dc, Level::High);
        Ok(())
    }

    fn write_data(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        for &b in data {
            self.write_byte(b);
        }
        Ok(())
    }
}
