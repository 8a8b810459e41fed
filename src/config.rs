//! Panel geometry and bus settings.

use core::fmt;

/// Depth of the controller transaction queue (six window steps plus one spare).
pub const QUEUE_DEPTH: usize = 7;

/// Default panel: 240 x 320 portrait (ILI9341 / ST7789 class).
pub const DEFAULT_WIDTH: u16 = 240;
pub const DEFAULT_HEIGHT: u16 = 320;

/// 40 MHz, the speed known to be stable on most SPI TFT wiring.
pub const DEFAULT_FREQUENCY_HZ: u32 = 40_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Width or height is zero.
    ZeroDimension,
    /// A GPIO number that does not fit the 32-bit port.
    InvalidPin(u8),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroDimension => write!(f, "display width and height must be non-zero"),
            ConfigError::InvalidPin(pin) => write!(f, "GPIO{pin} is outside the 32-bit port"),
        }
    }
}

/// SPI clock polarity / phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpiMode {
    #[default]
    Mode0,
    Mode1,
    Mode2,
    Mode3,
}

/// Engine configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    pub width: u16,
    pub height: u16,
    /// Initial state of the byte-swap flag.
    pub swap_bytes: bool,
    pub frequency_hz: u32,
    pub spi_mode: SpiMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            swap_bytes: false,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            spi_mode: SpiMode::Mode0,
        }
    }
}

impl Config {
    pub fn with_size(mut self, width: u16, height: u16) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_swap_bytes(mut self, swap: bool) -> Self {
        self.swap_bytes = swap;
        self
    }

    pub fn with_frequency_hz(mut self, hz: u32) -> Self {
        self.frequency_hz = hz;
        self
    }

    pub fn with_spi_mode(mut self, mode: SpiMode) -> Self {
        self.spi_mode = mode;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ZeroDimension);
        }
        Ok(())
    }

    /// Settings handed to the DMA host when the bus is acquired.
    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            // Whole screen of RGB565 plus room for the address bytes.
            max_transfer_bytes: self.width as usize * self.height as usize * 2 + 8,
            queue_depth: QUEUE_DEPTH,
            frequency_hz: self.frequency_hz,
            spi_mode: self.spi_mode,
        }
    }
}

/// What a DMA host needs to claim the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusConfig {
    pub max_transfer_bytes: usize,
    pub queue_depth: usize,
    pub frequency_hz: u32,
    pub spi_mode: SpiMode,
}

/// GPIO map of an 8-bit parallel bus. All pins live on the first GPIO port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParallelPins {
    /// D0..D7
    pub data: [u8; 8],
    /// Write strobe, data latched on the rising edge.
    pub wr: u8,
    /// Read strobe, active low.
    pub rd: u8,
    /// Data / command select.
    pub dc: u8,
}

impl ParallelPins {
    pub fn new(data: [u8; 8], wr: u8, rd: u8, dc: u8) -> Result<Self, ConfigError> {
        for pin in data.iter().copied().chain([wr, rd, dc]) {
            if pin >= 32 {
                return Err(ConfigError::InvalidPin(pin));
            }
        }
        Ok(Self { data, wr, rd, dc })
    }

    /// Set / clear masks that put `byte` on D0..D7.
    #[inline]
    pub fn data_masks(&self, byte: u8) -> (u32, u32) {
        let mut set = 0u32;
        let mut clear = 0u32;
        for (bit, &pin) in self.data.iter().enumerate() {
            if byte & (1 << bit) != 0 {
                set |= 1 << pin;
            } else {
                clear |= 1 << pin;
            }
        }
        (set, clear)
    }

    /// Gather D0..D7 back out of a raw port snapshot.
    #[inline]
    pub fn gather(&self, port: u32) -> u8 {
        self.data
            .iter()
            .enumerate()
            .fold(0u8, |b, (bit, &pin)| b | ((((port >> pin) & 1) as u8) << bit))
    }
}
