//! [`DmaHost`] over any embedded-hal `SpiDevice` plus a DC pin.
//!
//! `queue_transaction` only records the transaction. Its bytes move in
//! `await_completion`, oldest first, after the DC line has been set for it.
//! A submission therefore returns without touching the bus and the work
//! happens when its transfer is waited on. Buffer payloads are read in place
//! at that point, never copied.

use core::fmt;

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;
use heapless::Deque;

use crate::config::{BusConfig, QUEUE_DEPTH};
use crate::dma::{DcLevel, DmaHost, Payload, Transaction, TransactionId};

/// Error type that wraps SPI and DC pin errors.
#[derive(Debug)]
pub enum HostError<SpiE, DcE> {
    Spi(SpiE),
    Dc(DcE),
    /// Transaction queued before `acquire`.
    NotAcquired,
    AlreadyAcquired,
    QueueFull,
    /// Payload longer than the negotiated maximum.
    TransferTooLarge { bytes: usize, max: usize },
    /// Completion requested with nothing in flight.
    NothingQueued,
}

impl<SpiE: fmt::Debug, DcE: fmt::Debug> fmt::Display for HostError<SpiE, DcE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Spi(e) => write!(f, "SPI error: {e:?}"),
            HostError::Dc(e) => write!(f, "DC pin error: {e:?}"),
            HostError::NotAcquired => write!(f, "bus not acquired"),
            HostError::AlreadyAcquired => write!(f, "bus already acquired"),
            HostError::QueueFull => write!(f, "transaction queue full"),
            HostError::TransferTooLarge { bytes, max } => {
                write!(f, "{bytes} byte transfer exceeds {max} byte limit")
            }
            HostError::NothingQueued => write!(f, "no transaction in flight"),
        }
    }
}

// Payload of a recorded transaction.
#[derive(Clone, Copy)]
enum Queued {
    Inline([u8; 4], u8),
    // Kept alive by the caller of `queue_transaction` until completion.
    Borrowed(*const u8, usize),
}

struct Pending {
    id: TransactionId,
    dc: DcLevel,
    payload: Queued,
}

pub struct SpiDeviceHost<SPI, DC> {
    spi: SPI,
    dc: DC,
    bus: Option<BusConfig>,
    queue: Deque<Pending, QUEUE_DEPTH>,
}

impl<SPI, DC> SpiDeviceHost<SPI, DC>
where
    SPI: SpiDevice<u8>,
    DC: OutputPin,
{
    pub fn new(spi: SPI, dc: DC) -> Self {
        Self {
            spi,
            dc,
            bus: None,
            queue: Deque::new(),
        }
    }

    pub fn release(self) -> (SPI, DC) {
        (self.spi, self.dc)
    }

    /// Settings of the current acquisition, if any.
    pub fn bus_config(&self) -> Option<&BusConfig> {
        self.bus.as_ref()
    }

    /// Transactions recorded but not yet on the wire.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    // Runs before the bytes move, like a pre-transfer callback.
    fn apply_dc(&mut self, level: DcLevel) -> Result<(), DC::Error> {
        match level {
            DcLevel::Command => self.dc.set_low(),
            DcLevel::Data => self.dc.set_high(),
        }
    }
}

impl<SPI, DC> DmaHost for SpiDeviceHost<SPI, DC>
where
    SPI: SpiDevice<u8>,
    DC: OutputPin,
{
    type Error = HostError<SPI::Error, DC::Error>;

    fn acquire(&mut self, config: &BusConfig) -> Result<(), Self::Error> {
        if self.bus.is_some() {
            return Err(HostError::AlreadyAcquired);
        }
        self.queue.clear();
        self.bus = Some(*config);
        Ok(())
    }

    fn release(&mut self) {
        self.bus = None;
        self.queue.clear();
    }

    unsafe fn queue_transaction(
        &mut self,
        transaction: &Transaction<'_>,
    ) -> Result<(), Self::Error> {
        let max = self.bus.ok_or(HostError::NotAcquired)?.max_transfer_bytes;
        let len = transaction.bytes().len();
        if len > max {
            return Err(HostError::TransferTooLarge { bytes: len, max });
        }

        let payload = match transaction.payload {
            Payload::Inline { bytes, len } => Queued::Inline(bytes, len),
            Payload::Buffer(buf) => Queued::Borrowed(buf.as_ptr(), buf.len()),
        };
        self.queue
            .push_back(Pending {
                id: transaction.id,
                dc: transaction.dc,
                payload,
            })
            .map_err(|_| HostError::QueueFull)
    }

    fn await_completion(&mut self) -> Result<TransactionId, Self::Error> {
        let next = self.queue.pop_front().ok_or(HostError::NothingQueued)?;
        self.apply_dc(next.dc).map_err(HostError::Dc)?;
        match next.payload {
            Queued::Inline(bytes, len) => self.spi.write(&bytes[..len as usize]),
            Queued::Borrowed(ptr, len) => {
                // SAFETY: the `queue_transaction` contract keeps the buffer
                // alive and unmodified until this completion is returned.
                let bytes = unsafe { core::slice::from_raw_parts(ptr, len) };
                self.spi.write(bytes)
            }
        }
        .map_err(HostError::Spi)?;
        Ok(next.id)
    }
}
