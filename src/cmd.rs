/// MIPI DCS commands.
pub struct Cmd;

impl Cmd {
    pub const SWRESET: u8 = 0x01;
    pub const SLPOUT: u8 = 0x11;
    pub const DISPON: u8 = 0x29;
    /// Column address set.
    pub const CASET: u8 = 0x2A;
    /// Page (row) address set.
    pub const PASET: u8 = 0x2B;
    /// Memory write, pixel data follows.
    pub const RAMWR: u8 = 0x2C;
    /// Interface pixel format.
    pub const COLMOD: u8 = 0x3A;
}
