//! Bus primitives consumed by the push engines.
//
// Pin muxing, clock setup and peripheral bring-up live outside this crate;
// the engines only need the handful of register-level operations below.

/// Direction of a parallel data pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// Logic level of a control line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// Number of 32-bit data registers in the SPI hardware buffer (64 bytes).
pub const FIFO_WORDS: usize = 16;

/// Direct access to an SPI peripheral's CPU-mode data buffer.
///
/// One transfer is: load up to [`FIFO_WORDS`] words, program the bit length,
/// start, then poll [`transfer_busy`](Self::transfer_busy) until it clears.
/// Words are shifted out little-endian byte first, as on the ESP32 family.
pub trait SpiRegisters {
    /// Write `word` into data register `index` (W0..W15).
    fn load_register(&mut self, index: usize, word: u32);

    /// Program the MOSI bit length field (number of bits minus one).
    fn set_bit_length(&mut self, bits_minus_one: u32);

    /// Kick off the user transfer.
    fn start_transfer(&mut self);

    /// True while the current transfer is still shifting out.
    fn transfer_busy(&self) -> bool;

    /// Put the peripheral in CPU-buffer write mode before a burst.
    fn begin_write(&mut self) {}

    /// Spin until the hardware reports the transfer done.
    #[inline]
    fn wait_idle(&mut self) {
        while self.transfer_busy() {
            core::hint::spin_loop();
        }
    }
}

/// Register-level access to an 8-bit parallel (8080) bus.
///
/// Pins are GPIO numbers on a single 32-bit port.
pub trait ParallelBus {
    fn set_pin_direction(&mut self, pin: u8, mode: PinMode);

    fn write_control_line(&mut self, pin: u8, level: Level);

    /// Raw snapshot of the input port.
    fn read_input_port(&mut self) -> u32;

    /// Set and clear output bits in one write (W1TS / W1TC style).
    fn write_output_masks(&mut self, set: u32, clear: u32);
}
