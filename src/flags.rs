///! Brush content and surface flags

use bitflags::bitflags;

bitflags! {
    /// Brush volume contents
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Contents: u32 {
        const SOLID = 0x1;
        const WINDOW = 0x2;
        const WATER = 0x20;
        const LEVEL_1 = 0x100;
        const LEVEL_2 = 0x200;
        const LEVEL_3 = 0x400;
        const LEVEL_4 = 0x800;
        const LEVEL_5 = 0x1000;
        const LEVEL_6 = 0x2000;
        const LEVEL_7 = 0x4000;
        const LEVEL_8 = 0x8000;
        const ACTORCLIP = 0x10000;
        const PASSABLE = 0x20000;
        const ORIGIN = 0x1000000;
        const WEAPONCLIP = 0x2000000;
        const DEADACTOR = 0x4000000;
        const DETAIL = 0x8000000;
        const TRANSLUCENT = 0x10000000;
        const STEPON = 0x40000000;

        const _ = !0;
    }
}

bitflags! {
    /// Per-side surface flags
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SurfaceFlags: u32 {
        const LIGHT = 0x1;
        const SLICK = 0x2;
        const WARP = 0x8;
        const TRANS33 = 0x10;
        const TRANS66 = 0x20;
        const FLOWING = 0x40;
        const NODRAW = 0x80;
        const HINT = 0x100;
        const SKIP = 0x200;
        const ALPHATEST = 0x2000000;

        const _ = !0;
    }
}

/// Highest content bit that is visible
pub const LAST_VISIBLE_CONTENTS: u32 = 0x80;

impl Contents {
    /// All level bits
    pub const LEVEL_ALL: Contents = Contents::from_bits_retain(0xFF00);

    /// Visible part of contents
    pub fn visible(self) -> Contents {
        Contents::from_bits_retain(self.bits() & (LAST_VISIBLE_CONTENTS * 2 - 1))
    }

    /// Strongest (lowest) visible content bit, empty if none
    pub fn strongest_visible(self) -> Contents {
        let visible = self.visible().bits();

        Contents::from_bits_retain(visible & visible.wrapping_neg())
    }

    /// 8-bit level mask
    pub fn level_mask(self) -> u8 {
        ((self.bits() >> 8) & 0xFF) as u8
    }

    /// Any of clip flags
    pub fn is_clip(self) -> bool {
        self.intersects(Contents::ACTORCLIP | Contents::WEAPONCLIP)
    }
}

impl SurfaceFlags {
    /// Surface is drawn translucent
    pub fn is_translucent(self) -> bool {
        self.intersects(SurfaceFlags::TRANS33 | SurfaceFlags::TRANS66 | SurfaceFlags::ALPHATEST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strongest_visible_bit() {
        let contents = Contents::WATER | Contents::WINDOW | Contents::LEVEL_1;

        assert_eq!(contents.strongest_visible(), Contents::WINDOW);
        assert_eq!(Contents::LEVEL_3.strongest_visible(), Contents::empty());
    }

    #[test]
    fn level_mask() {
        assert_eq!((Contents::SOLID | Contents::LEVEL_ALL).level_mask(), 0xFF);
        assert_eq!(Contents::LEVEL_2.level_mask(), 0x02);
    }
}

// flags.rs
