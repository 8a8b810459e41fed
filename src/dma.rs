//! Queued DMA transfers.
//!
//! Two operations feed the controller queue:
//!
//! * [`DmaEngine::submit_fill`] - one data transaction carrying a pixel run.
//! * [`DmaEngine::submit_window`] - six transactions that address a window and
//!   stream a clipped (and optionally byte-swapped) copy of an image into it:
//!   `CASET`, column range, `PASET`, row range, `RAMWR`, pixels.
//!
//! Each submission returns a [`DmaTransfer`] as soon as its transactions are
//! queued. The transfer keeps the engine and the submitted buffers borrowed
//! until the controller reports every transaction complete; waiting on it or
//! dropping it drains the queue.
//!
//! Transactions complete strictly in submission order. A new submission first
//! drains anything still in flight, so the staging buffer and the queue are
//! never touched while the hardware may still read them.
//!
//! Bus acquisition failures and controller faults are not recoverable and
//! panic. A completion that arrives out of submission order counts as a
//! controller fault.

use core::fmt;

use heapless::Deque;
use log::{debug, info, trace, warn};

use crate::cmd::Cmd;
use crate::color::{copy_pixels, swap_pixels};
use crate::config::{BusConfig, Config, QUEUE_DEPTH};
use crate::window::{ClippedWindow, WindowRect};

/// Largest pixel run accepted by [`DmaEngine::submit_fill`].
pub const MAX_FILL_PIXELS: usize = 32_767;

/// Largest clipped window accepted by [`DmaEngine::submit_window`].
pub const MAX_WINDOW_PIXELS: usize = 65_535;

/// Transactions queued per window transfer.
pub const WINDOW_TRANSACTIONS: usize = 6;

/// Sequence number stamped on each queued transaction.
pub type TransactionId = u32;

/// State of the command / data line while a transaction is on the wire.
///
/// Hosts apply it in their pre-transfer hook, before any byte moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DcLevel {
    Command,
    Data,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Payload<'a> {
    /// Up to four bytes carried in the descriptor itself.
    Inline { bytes: [u8; 4], len: u8 },
    /// Bulk data read by DMA.
    Buffer(&'a [u8]),
}

/// One bus transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transaction<'a> {
    pub id: TransactionId,
    pub dc: DcLevel,
    pub payload: Payload<'a>,
}

impl<'a> Transaction<'a> {
    pub fn command(id: TransactionId, cmd: u8) -> Self {
        Self {
            id,
            dc: DcLevel::Command,
            payload: Payload::Inline {
                bytes: [cmd, 0, 0, 0],
                len: 1,
            },
        }
    }

    pub fn data(id: TransactionId, bytes: [u8; 4]) -> Self {
        Self {
            id,
            dc: DcLevel::Data,
            payload: Payload::Inline { bytes, len: 4 },
        }
    }

    /// Pixels go out in memory byte order.
    pub fn pixels(id: TransactionId, pixels: &'a [u16]) -> Self {
        Self {
            id,
            dc: DcLevel::Data,
            payload: Payload::Buffer(bytemuck::cast_slice(pixels)),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.payload {
            Payload::Inline { bytes, len } => &bytes[..*len as usize],
            Payload::Buffer(buf) => *buf,
        }
    }

    /// Transfer length in bits, as programmed into the descriptor.
    pub fn bit_length(&self) -> usize {
        self.bytes().len() * 8
    }
}

/// The SPI controller driver behind the queue.
pub trait DmaHost {
    type Error: fmt::Debug;

    /// Claim the bus and attach the display device.
    fn acquire(&mut self, config: &BusConfig) -> Result<(), Self::Error>;

    /// Free the bus, dropping anything still queued.
    fn release(&mut self);

    /// Hand one transaction to the controller and return without waiting.
    ///
    /// # Safety
    ///
    /// The bytes behind a [`Payload::Buffer`] must stay alive and unmodified
    /// until [`await_completion`](Self::await_completion) has returned this
    /// transaction's id, or until [`release`](Self::release), so the host may
    /// keep reading them after this call returns. Inline payloads travel with
    /// the transaction; a host that needs them later copies the transaction.
    unsafe fn queue_transaction(
        &mut self,
        transaction: &Transaction<'_>,
    ) -> Result<(), Self::Error>;

    /// Block until the oldest queued transaction finishes and return its id.
    fn await_completion(&mut self) -> Result<TransactionId, Self::Error>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmaState {
    /// Nothing in flight.
    Idle,
    /// Transactions handed to the controller.
    Queued,
    /// Collecting completions.
    Draining,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmaError {
    TransferTooLarge { pixels: usize, max: usize },
    ImageTooSmall { needed: usize, len: usize },
    StagingTooSmall { needed: usize, len: usize },
}

impl fmt::Display for DmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DmaError::TransferTooLarge { pixels, max } => {
                write!(f, "transfer of {pixels} pixels exceeds the {max} pixel limit")
            }
            DmaError::ImageTooSmall { needed, len } => {
                write!(f, "image holds {len} pixels, window reads {needed}")
            }
            DmaError::StagingTooSmall { needed, len } => {
                write!(f, "staging buffer holds {len} pixels, window needs {needed}")
            }
        }
    }
}

/// DMA transfer engine bound to one display.
pub struct DmaEngine<H> {
    host: H,
    bus: BusConfig,
    width: u16,
    height: u16,
    enabled: bool,
    state: DmaState,
    in_flight: Deque<TransactionId, QUEUE_DEPTH>,
    next_id: TransactionId,
}

impl<H> DmaEngine<H> {
    pub fn new(host: H, config: &Config) -> Self {
        Self {
            host,
            bus: config.bus_config(),
            width: config.width,
            height: config.height,
            enabled: false,
            state: DmaState::Idle,
            in_flight: Deque::new(),
            next_id: 0,
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Transactions queued but not yet seen complete.
    #[inline]
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    #[inline]
    pub fn state(&self) -> DmaState {
        self.state
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn release(self) -> H {
        self.host
    }

    fn take_id(&mut self) -> TransactionId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}

impl<H: DmaHost> DmaEngine<H> {
    /// Bind the bus to the DMA-capable controller.
    ///
    /// Returns `false` if already initialised. Panics if the host cannot
    /// acquire the bus.
    pub fn init(&mut self) -> bool {
        if self.enabled {
            warn!("DMA already initialised");
            return false;
        }
        if let Err(e) = self.host.acquire(&self.bus) {
            panic!("DMA bus acquisition failed: {e:?}");
        }
        self.enabled = true;
        self.in_flight.clear();
        self.state = DmaState::Idle;
        info!(
            "DMA enabled: {}x{}, max transfer {} bytes, queue depth {}",
            self.width, self.height, self.bus.max_transfer_bytes, self.bus.queue_depth
        );
        true
    }

    /// Drain outstanding transactions and release the bus.
    pub fn deinit(&mut self) {
        if !self.enabled {
            return;
        }
        self.wait();
        self.host.release();
        self.enabled = false;
        info!("DMA released");
    }

    /// Always reports `false`: a non-empty queue is drained first.
    pub fn is_busy(&mut self) -> bool {
        if !self.enabled || self.in_flight.is_empty() {
            return false;
        }
        self.wait();
        false
    }

    /// Block until every queued transaction has completed.
    ///
    /// Panics if the controller reports a completion out of submission order.
    pub fn wait(&mut self) {
        if !self.enabled || self.in_flight.is_empty() {
            return;
        }
        self.state = DmaState::Draining;
        while let Some(&expected) = self.in_flight.front() {
            match self.host.await_completion() {
                Ok(id) if id == expected => {
                    self.in_flight.pop_front();
                }
                Ok(id) => panic!("DMA completion out of order: expected #{expected}, got #{id}"),
                Err(e) => panic!("DMA completion failed: {e:?}"),
            }
        }
        self.state = DmaState::Idle;
    }

    /// Queue one data transaction carrying `pixels` as stored in memory.
    ///
    /// An empty run, or a call before [`init`](Self::init), queues nothing.
    pub fn submit_fill<'a>(
        &'a mut self,
        pixels: &'a [u16],
    ) -> Result<DmaTransfer<'a, H>, DmaError> {
        if pixels.is_empty() || !self.enabled {
            trace!("DMA fill skipped ({} pixels, enabled={})", pixels.len(), self.enabled);
            return Ok(DmaTransfer::new(self));
        }
        if pixels.len() > MAX_FILL_PIXELS {
            return Err(DmaError::TransferTooLarge {
                pixels: pixels.len(),
                max: MAX_FILL_PIXELS,
            });
        }

        self.wait();
        let id = self.take_id();
        // SAFETY: `pixels` stays borrowed by the returned transfer, which
        // drains the queue before releasing it.
        unsafe { self.queue(&Transaction::pixels(id, pixels)) };
        self.state = DmaState::Queued;
        Ok(DmaTransfer::new(self))
    }

    /// Transfer a `rect.w` x `rect.h` image to `rect`, clipped to the panel.
    ///
    /// The visible part is copied into `staging` (byte-swapped when `swap`
    /// is set) and sent from there; `image` is never modified. Returns once
    /// the transactions are queued.
    pub fn submit_window<'a>(
        &'a mut self,
        rect: WindowRect,
        image: &[u16],
        staging: &'a mut [u16],
        swap: bool,
    ) -> Result<DmaTransfer<'a, H>, DmaError> {
        let Some(win) = self.prepare_window(rect, image.len())? else {
            return Ok(DmaTransfer::new(self));
        };
        let len = win.pixel_count();
        if staging.len() < len {
            return Err(DmaError::StagingTooSmall {
                needed: len,
                len: staging.len(),
            });
        }

        self.wait();

        let staged = &mut staging[..len];
        if win.is_clipped() {
            let w = win.w as usize;
            for (row, dst) in staged.chunks_exact_mut(w).enumerate() {
                let src = win.source_offset(row);
                copy_pixels(dst, &image[src..src + w], swap);
            }
        } else {
            copy_pixels(staged, &image[..len], swap);
        }

        // SAFETY: `staging` stays borrowed by the returned transfer.
        unsafe { self.queue_window(&win, staged) };
        Ok(DmaTransfer::new(self))
    }

    /// Like [`submit_window`](Self::submit_window) without a staging buffer.
    ///
    /// `image` itself becomes the payload: a clipped window is compacted row by
    /// row to the front of `image`, and `swap` byte-swaps it in place.
    pub fn submit_window_in_place<'a>(
        &'a mut self,
        rect: WindowRect,
        image: &'a mut [u16],
        swap: bool,
    ) -> Result<DmaTransfer<'a, H>, DmaError> {
        let Some(win) = self.prepare_window(rect, image.len())? else {
            return Ok(DmaTransfer::new(self));
        };
        let len = win.pixel_count();

        self.wait();

        if win.is_clipped() {
            // Rows only ever move towards the front.
            let w = win.w as usize;
            for row in 0..win.h as usize {
                let src = win.source_offset(row);
                image.copy_within(src..src + w, row * w);
            }
        }
        if swap {
            swap_pixels(&mut image[..len]);
        }

        // SAFETY: `image` stays borrowed by the returned transfer.
        unsafe { self.queue_window(&win, &image[..len]) };
        Ok(DmaTransfer::new(self))
    }

    /// Reject, clip and bounds-check a window. `Ok(None)` means no-op.
    fn prepare_window(
        &self,
        rect: WindowRect,
        image_len: usize,
    ) -> Result<Option<ClippedWindow>, DmaError> {
        if !self.enabled {
            trace!("DMA window skipped, engine not initialised");
            return Ok(None);
        }
        let Some(win) = rect.clip(self.width, self.height) else {
            trace!("DMA window {:?} is off screen", rect);
            return Ok(None);
        };

        let len = win.pixel_count();
        if len > MAX_WINDOW_PIXELS {
            return Err(DmaError::TransferTooLarge {
                pixels: len,
                max: MAX_WINDOW_PIXELS,
            });
        }
        let needed = win.source_offset(win.h as usize - 1) + win.w as usize;
        if image_len < needed {
            return Err(DmaError::ImageTooSmall {
                needed,
                len: image_len,
            });
        }

        if win.is_clipped() {
            debug!(
                "DMA window {:?} clipped to {}x{} at ({}, {}), source offset ({}, {})",
                rect, win.w, win.h, win.x, win.y, win.dx, win.dy
            );
        }
        Ok(Some(win))
    }

    /// # Safety
    ///
    /// `pixels` must outlive the drain of this window's transactions.
    unsafe fn queue_window(&mut self, win: &ClippedWindow, pixels: &[u16]) {
        let steps: [Transaction<'_>; WINDOW_TRANSACTIONS] = [
            Transaction::command(self.take_id(), Cmd::CASET),
            Transaction::data(self.take_id(), win.column_range()),
            Transaction::command(self.take_id(), Cmd::PASET),
            Transaction::data(self.take_id(), win.row_range()),
            Transaction::command(self.take_id(), Cmd::RAMWR),
            Transaction::pixels(self.take_id(), pixels),
        ];
        for step in &steps {
            // SAFETY: `pixels` is the only buffer payload and the caller
            // keeps it alive.
            unsafe { self.queue(step) };
        }
        self.state = DmaState::Queued;
    }

    /// # Safety
    ///
    /// See [`DmaHost::queue_transaction`].
    unsafe fn queue(&mut self, transaction: &Transaction<'_>) {
        if let Err(e) = unsafe { self.host.queue_transaction(transaction) } {
            panic!("DMA queue rejected transaction #{}: {e:?}", transaction.id);
        }
        if self.in_flight.push_back(transaction.id).is_err() {
            panic!("DMA queue overflow at transaction #{}", transaction.id);
        }
    }
}

/// Transactions queued by one submission.
///
/// Keeps the engine and the submitted buffers borrowed while the controller
/// works through them. [`wait`](Self::wait), or dropping the transfer, blocks
/// until every transaction has completed. Leaking it with `mem::forget` ends
/// the borrow early, and the controller may then read freed memory.
#[must_use = "dropping a DMA transfer blocks until it completes"]
pub struct DmaTransfer<'a, H: DmaHost> {
    engine: &'a mut DmaEngine<H>,
}

impl<'a, H: DmaHost> DmaTransfer<'a, H> {
    fn new(engine: &'a mut DmaEngine<H>) -> Self {
        Self { engine }
    }

    /// Transactions of this transfer not yet seen complete.
    #[inline]
    pub fn pending(&self) -> usize {
        self.engine.pending()
    }

    /// Drains the transfer, so always `false` on return.
    pub fn is_busy(&mut self) -> bool {
        self.engine.is_busy()
    }

    /// Block until the controller is done with the submitted buffers.
    pub fn wait(self) {
        // Dropping drains the queue.
    }
}

impl<H: DmaHost> Drop for DmaTransfer<'_, H> {
    fn drop(&mut self) {
        self.engine.wait();
    }
}
