//! The engine context: one display, one push strategy, one optional DMA host.

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use log::trace;

use crate::config::{Config, ConfigError};
use crate::dma::{DmaEngine, DmaError, DmaHost, DmaTransfer};
use crate::push::{DmaCapable, PushStrategy};
use crate::window::WindowRect;

/// Pixels buffered per `push_pixels` call on the `fill_contiguous` path.
const STREAM_CHUNK: usize = 64;

/// A display driven through push strategy `S` and, optionally, DMA host `H`.
///
/// Without a host (`H = ()`) only the synchronous path is available; attach
/// one with [`with_dma`](Tft::with_dma). DMA sends 16-bit pixels as stored,
/// so only [`DmaCapable`] strategies can take a host.
pub struct Tft<S, H = ()> {
    strategy: S,
    dma: DmaEngine<H>,
    config: Config,
    swap_bytes: bool,
}

impl<S: PushStrategy> Tft<S> {
    pub fn new(strategy: S, config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            strategy,
            dma: DmaEngine::new((), &config),
            config,
            swap_bytes: config.swap_bytes,
        })
    }

    pub fn with_dma<H: DmaHost>(self, host: H) -> Tft<S, H>
    where
        S: DmaCapable,
    {
        Tft {
            dma: DmaEngine::new(host, &self.config),
            strategy: self.strategy,
            config: self.config,
            swap_bytes: self.swap_bytes,
        }
    }
}

impl<S: PushStrategy, H> Tft<S, H> {
    #[inline]
    pub fn width(&self) -> u16 {
        self.config.width
    }

    #[inline]
    pub fn height(&self) -> u16 {
        self.config.height
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn swap_bytes(&self) -> bool {
        self.swap_bytes
    }

    /// Byte order used by `push_pixels` and the DMA image path.
    pub fn set_swap_bytes(&mut self, swap: bool) {
        self.swap_bytes = swap;
    }

    pub fn strategy_mut(&mut self) -> &mut S {
        &mut self.strategy
    }

    /// DMA transactions not yet seen complete.
    pub fn dma_pending(&self) -> usize {
        self.dma.pending()
    }

    pub fn release(self) -> (S, H) {
        (self.strategy, self.dma.release())
    }

    /// Write `len` copies of `color` into the open window.
    pub fn push_block(&mut self, color: u16, len: u32) {
        self.strategy.push_block(color, len);
    }

    pub fn push_pixels(&mut self, data: &[u16]) {
        self.strategy.push_pixels(data, self.swap_bytes);
    }

    pub fn push_swap_byte_pixels(&mut self, data: &[u16]) {
        self.strategy.push_swap_byte_pixels(data);
    }

    /// Open the inclusive window `(x0, y0)..=(x1, y1)` for a memory write.
    pub fn set_window(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) -> Result<(), S::Error> {
        self.strategy.set_window(x0, y0, x1, y1)
    }

    fn bounds(&self) -> Rectangle {
        Rectangle::new(
            Point::zero(),
            Size::new(u32::from(self.config.width), u32::from(self.config.height)),
        )
    }

    // `area` must already lie on the panel.
    fn open(&mut self, area: &Rectangle) -> Result<(), S::Error> {
        let x0 = area.top_left.x as u16;
        let y0 = area.top_left.y as u16;
        let x1 = x0 + area.size.width as u16 - 1;
        let y1 = y0 + area.size.height as u16 - 1;
        self.strategy.set_window(x0, y0, x1, y1)
    }
}

impl<S: DmaCapable, H: DmaHost> Tft<S, H> {
    /// See [`DmaEngine::init`].
    pub fn init_dma(&mut self) -> bool {
        self.dma.init()
    }

    pub fn deinit_dma(&mut self) {
        self.dma.deinit();
    }

    /// Drains the queue if needed, so always `false` on return.
    pub fn dma_busy(&mut self) -> bool {
        self.dma.is_busy()
    }

    pub fn dma_wait(&mut self) {
        self.dma.wait();
    }

    /// Queue `pixels` into the open window, as stored in memory.
    ///
    /// The returned transfer holds `pixels` until the controller is done.
    pub fn push_pixels_dma<'a>(
        &'a mut self,
        pixels: &'a [u16],
    ) -> Result<DmaTransfer<'a, H>, DmaError> {
        self.dma.submit_fill(pixels)
    }

    /// Queue a `w` x `h` image at `(x, y)`, clipped, through `staging`.
    ///
    /// `image` is free again on return; `staging` stays with the transfer.
    pub fn push_image_dma<'a>(
        &'a mut self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        image: &[u16],
        staging: &'a mut [u16],
    ) -> Result<DmaTransfer<'a, H>, DmaError> {
        self.dma
            .submit_window(WindowRect::new(x, y, w, h), image, staging, self.swap_bytes)
    }

    /// Queue a `w` x `h` image at `(x, y)` straight out of `image`.
    ///
    /// Clipping and byte swapping rewrite `image`.
    pub fn push_image_dma_in_place<'a>(
        &'a mut self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        image: &'a mut [u16],
    ) -> Result<DmaTransfer<'a, H>, DmaError> {
        self.dma
            .submit_window_in_place(WindowRect::new(x, y, w, h), image, self.swap_bytes)
    }
}

// -------------------- embedded-graphics integration --------------------
impl<S: PushStrategy, H> OriginDimensions for Tft<S, H> {
    fn size(&self) -> Size {
        Size::new(u32::from(self.config.width), u32::from(self.config.height))
    }
}

impl<S: PushStrategy, H> DrawTarget for Tft<S, H> {
    type Color = Rgb565;
    type Error = S::Error;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Rgb565>>,
    {
        let (w, h) = (i32::from(self.config.width), i32::from(self.config.height));
        for Pixel(p, c) in pixels {
            if p.x < 0 || p.y < 0 || p.x >= w || p.y >= h {
                continue;
            }
            let (x, y) = (p.x as u16, p.y as u16);
            self.strategy.set_window(x, y, x, y)?;
            self.strategy.push_block(c.into_storage(), 1);
        }
        Ok(())
    }

    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Rgb565>,
    {
        let inter = area.intersection(&self.bounds());
        if inter.size.width == 0 || inter.size.height == 0 {
            trace!("fill_contiguous {:?} is off screen", area);
            return Ok(());
        }

        let area_w = area.size.width as usize;
        let take = inter.size.width as usize;
        let left_skip = (inter.top_left.x - area.top_left.x) as usize;
        let right_skip = area_w - left_skip - take;
        let top_skip = (inter.top_left.y - area.top_left.y) as usize;

        self.open(&inter)?;

        let mut it = colors.into_iter();
        if top_skip > 0 {
            it.nth(top_skip * area_w - 1);
        }

        // Colours are logical values, so they go out unswapped.
        let mut buf = [0u16; STREAM_CHUNK];
        let mut fill = 0;
        for _ in 0..inter.size.height {
            if left_skip > 0 {
                it.nth(left_skip - 1);
            }
            for c in it.by_ref().take(take) {
                buf[fill] = c.into_storage();
                fill += 1;
                if fill == STREAM_CHUNK {
                    self.strategy.push_pixels(&buf, true);
                    fill = 0;
                }
            }
            if right_skip > 0 {
                it.nth(right_skip - 1);
            }
        }
        if fill > 0 {
            self.strategy.push_pixels(&buf[..fill], true);
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Rgb565) -> Result<(), Self::Error> {
        let inter = area.intersection(&self.bounds());
        if inter.size.width == 0 || inter.size.height == 0 {
            return Ok(());
        }
        self.open(&inter)?;
        self.strategy
            .push_block(color.into_storage(), inter.size.width * inter.size.height);
        Ok(())
    }

    fn clear(&mut self, color: Rgb565) -> Result<(), Self::Error> {
        self.fill_solid(&self.bounds(), color)
    }
}
