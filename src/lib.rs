#![no_std]

pub mod bus;
pub mod cmd;
pub mod color;
pub mod config;
pub mod dma;
pub mod push;
pub mod spi_host;
pub mod tft;
pub mod window;

cfg_if::cfg_if! {
    if #[cfg(feature = "esp32s3")] {
        pub mod display;
        pub mod regs;
        pub mod wiring;
    }
}

pub use color::{BusMode, ColorFormat, PixelFormat, Rgb565Format, Rgb666Format};
pub use config::{BusConfig, Config, ConfigError, ParallelPins, SpiMode};
pub use dma::{
    DcLevel, DmaEngine, DmaError, DmaHost, DmaState, DmaTransfer, Payload, Transaction,
    TransactionId,
};
pub use push::{DmaCapable, ParallelPush, PushStrategy, SpiPush, SpiStrobePush};
pub use spi_host::{HostError, SpiDeviceHost};
pub use tft::Tft;
pub use window::{ClippedWindow, WindowRect};
