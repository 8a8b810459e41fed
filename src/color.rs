//! Pixel packing: RGB565 source pixels to controller wire format.
//!
//! Source pixels are 16-bit RGB565 values. Their "natural" bytes are the
//! in-memory (little-endian) bytes, so an unswapped pixel reaches the
//! controller low byte first. Setting the swap flag sends the high byte
//! first, which is what a controller expects for a plain `u16` colour.

/// Width of the bus the controller is wired to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusMode {
    /// 1-bit SPI (MOSI + SCK, DC on a GPIO).
    Serial,
    /// 8080-style 8-bit parallel with WR/RD strobes.
    Parallel8,
}

/// Pixel encoding accepted by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorFormat {
    /// 16 bits per pixel, sent as is.
    Rgb565,
    /// 18-bit colour packed into three left-justified bytes (ILI9488 style).
    Rgb666,
}

impl ColorFormat {
    #[inline]
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            ColorFormat::Rgb565 => 16,
            ColorFormat::Rgb666 => 24,
        }
    }

    /// Pixels per full SPI hardware batch (16 words for RGB565, 15 for RGB666).
    #[inline]
    pub const fn batch_pixels(self) -> usize {
        match self {
            ColorFormat::Rgb565 => 32,
            ColorFormat::Rgb666 => 20,
        }
    }
}

/// Compile-time pixel format marker used to pick a push strategy.
pub trait PixelFormat {
    const FORMAT: ColorFormat;

    /// Encoded bytes of one logical colour.
    type Bytes: AsRef<[u8]> + Copy;

    fn encode(color: u16) -> Self::Bytes;
}

/// RGB565 controllers (ILI9341, ST7789, ...).
#[derive(Clone, Copy, Debug, Default)]
pub struct Rgb565Format;

/// RGB666 controllers that need 3 bytes per pixel on SPI (ILI9488).
#[derive(Clone, Copy, Debug, Default)]
pub struct Rgb666Format;

impl PixelFormat for Rgb565Format {
    const FORMAT: ColorFormat = ColorFormat::Rgb565;
    type Bytes = [u8; 2];

    #[inline]
    fn encode(color: u16) -> [u8; 2] {
        color.to_be_bytes()
    }
}

impl PixelFormat for Rgb666Format {
    const FORMAT: ColorFormat = ColorFormat::Rgb666;
    type Bytes = [u8; 3];

    #[inline]
    fn encode(color: u16) -> [u8; 3] {
        encode_rgb666(color)
    }
}

/// Logical colour the controller sees for a stored pixel.
#[inline]
pub const fn wire_color(pixel: u16, swap: bool) -> u16 {
    if swap {
        pixel
    } else {
        pixel.swap_bytes()
    }
}

/// Expand RGB565 to left-justified `[R, G, B]` bytes.
#[inline]
pub const fn encode_rgb666(color: u16) -> [u8; 3] {
    [
        ((color & 0xF800) >> 8) as u8,
        ((color & 0x07E0) >> 3) as u8,
        ((color & 0x001F) << 3) as u8,
    ]
}

/// One FIFO word holding two copies of `color`, high byte first on the wire.
#[inline]
pub const fn pack_rgb565_fill(color: u16) -> u32 {
    let [hi, lo] = color.to_be_bytes();
    u32::from_le_bytes([hi, lo, hi, lo])
}

/// One FIFO word holding two stored pixels, each passed through [`wire_color`].
#[inline]
pub const fn pack_rgb565_pair(first: u16, second: u16, swap: bool) -> u32 {
    let a = wire_color(first, swap).to_be_bytes();
    let b = wire_color(second, swap).to_be_bytes();
    u32::from_le_bytes([a[0], a[1], b[0], b[1]])
}

/// Four RGB666 pixels of one colour folded into three FIFO words.
///
/// The words repeat `r0, r1, r2` for as long as the fill runs, so a batch of
/// 20 pixels is five copies of the triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb666Block {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
}

impl Rgb666Block {
    pub const fn new(color: u16) -> Self {
        let r = ((color & 0xF800) >> 8) as u32;
        let g = ((color & 0x07E0) as u32) << 5;
        let b = ((color & 0x001F) as u32) << 19;

        let r0 = r << 24 | b | g | r;
        let r1 = r0 >> 8 | g << 16;
        let r2 = r1 >> 8 | b << 8;
        Self { r0, r1, r2 }
    }

    /// Word `index` of an endless `r0, r1, r2, r0, ...` run.
    #[inline]
    pub const fn word(&self, index: usize) -> u32 {
        match index % 3 {
            0 => self.r0,
            1 => self.r1,
            _ => self.r2,
        }
    }
}

/// Byte-swap every pixel in place. Applying it twice is a no-op.
pub fn swap_pixels(pixels: &mut [u16]) {
    for px in pixels.iter_mut() {
        *px = px.swap_bytes();
    }
}

/// Copy `src` into `dst`, swapping bytes when `swap` is set.
pub fn copy_pixels(dst: &mut [u16], src: &[u16], swap: bool) {
    if swap {
        for (d, s) in dst.iter_mut().zip(src) {
            *d = s.swap_bytes();
        }
    } else {
        dst.copy_from_slice(src);
    }
}
