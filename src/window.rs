//! Target rectangles and clipping against the panel.

/// Rectangle in panel pixel coordinates. The origin may be negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowRect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

/// A rectangle that lies fully on the panel, plus where to read it from the
/// source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClippedWindow {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
    /// Columns cut from the left of the source.
    pub dx: u32,
    /// Rows cut from the top of the source.
    pub dy: u32,
    /// Row length of the source image (the unclipped width).
    pub stride: u32,
    /// Row count of the source image (the unclipped height).
    pub rows: u32,
}

impl WindowRect {
    pub const fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Pixels in the unclipped source image.
    #[inline]
    pub fn source_len(&self) -> usize {
        self.w as usize * self.h as usize
    }

    /// Clip against a `width` x `height` panel.
    ///
    /// Returns `None` when nothing is left to draw.
    pub fn clip(&self, width: u16, height: u16) -> Option<ClippedWindow> {
        let (pw, ph) = (i64::from(width), i64::from(height));
        let (mut x, mut y) = (i64::from(self.x), i64::from(self.y));
        let (mut w, mut h) = (i64::from(self.w), i64::from(self.h));
        if x >= pw || y >= ph {
            return None;
        }

        let (mut dx, mut dy) = (0i64, 0i64);
        if x < 0 {
            w += x;
            dx = -x;
            x = 0;
        }
        if y < 0 {
            h += y;
            dy = -y;
            y = 0;
        }
        if x + w > pw {
            w = pw - x;
        }
        if y + h > ph {
            h = ph - y;
        }
        if w < 1 || h < 1 {
            return None;
        }

        Some(ClippedWindow {
            x: x as u16,
            y: y as u16,
            w: w as u16,
            h: h as u16,
            dx: dx as u32,
            dy: dy as u32,
            stride: self.w,
            rows: self.h,
        })
    }
}

impl ClippedWindow {
    /// True if clipping removed any rows or columns.
    #[inline]
    pub fn is_clipped(&self) -> bool {
        u32::from(self.w) != self.stride || u32::from(self.h) != self.rows
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.w as usize * self.h as usize
    }

    /// Column address range `[start_hi, start_lo, end_hi, end_lo]`.
    #[inline]
    pub fn column_range(&self) -> [u8; 4] {
        address_range(self.x, self.x + self.w - 1)
    }

    /// Row (page) address range `[start_hi, start_lo, end_hi, end_lo]`.
    #[inline]
    pub fn row_range(&self) -> [u8; 4] {
        address_range(self.y, self.y + self.h - 1)
    }

    /// Offset of visible row `row` inside the source image.
    #[inline]
    pub fn source_offset(&self, row: usize) -> usize {
        self.dx as usize + self.stride as usize * (row + self.dy as usize)
    }
}

/// Big-endian start / end pair as sent after `CASET` / `PASET`.
#[inline]
pub const fn address_range(start: u16, end: u16) -> [u8; 4] {
    let [s_hi, s_lo] = start.to_be_bytes();
    let [e_hi, e_lo] = end.to_be_bytes();
    [s_hi, s_lo, e_hi, e_lo]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_x_shifts_source_offset() {
        let c = WindowRect::new(-5, 0, 20, 10).clip(16, 16).unwrap();
        assert_eq!((c.x, c.w, c.dx), (0, 15, 5));
        assert_eq!((c.y, c.h, c.dy), (0, 10, 0));
        assert!(c.is_clipped());
        assert_eq!(c.source_offset(2), 5 + 20 * 2);
    }

    #[test]
    fn right_and_bottom_edges_trimmed() {
        let c = WindowRect::new(10, 12, 10, 10).clip(16, 16).unwrap();
        assert_eq!((c.x, c.y, c.w, c.h), (10, 12, 6, 4));
        assert_eq!(c.column_range(), [0, 10, 0, 15]);
        assert_eq!(c.row_range(), [0, 12, 0, 15]);
    }

    #[test]
    fn fully_inside_is_not_clipped() {
        let c = WindowRect::new(2, 3, 4, 5).clip(16, 16).unwrap();
        assert!(!c.is_clipped());
        assert_eq!(c.pixel_count(), 20);
    }

    #[test]
    fn outside_windows_rejected() {
        assert!(WindowRect::new(16, 0, 4, 4).clip(16, 16).is_none());
        assert!(WindowRect::new(0, 16, 4, 4).clip(16, 16).is_none());
        assert!(WindowRect::new(-4, 0, 4, 4).clip(16, 16).is_none());
        assert!(WindowRect::new(0, -10, 4, 4).clip(16, 16).is_none());
        assert!(WindowRect::new(3, 3, 0, 4).clip(16, 16).is_none());
    }

    #[test]
    fn clipped_rect_stays_on_panel() {
        for x in -20..20 {
            for y in [-7, 0, 9, 15] {
                if let Some(c) = WindowRect::new(x, y, 11, 9).clip(16, 16) {
                    assert!(u32::from(c.x) + u32::from(c.w) <= 16);
                    assert!(u32::from(c.y) + u32::from(c.h) <= 16);
                    assert!(c.w >= 1 && c.h >= 1);
                }
            }
        }
    }

    #[test]
    fn wide_coordinates_split_into_bytes() {
        assert_eq!(address_range(0x0123, 0x01DF), [0x01, 0x23, 0x01, 0xDF]);
    }
}
