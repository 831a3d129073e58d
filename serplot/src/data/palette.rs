use serde::Serialize;

/// An RGB display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn from_rgb(rgb: u32) -> Color {
        Color {
            r: (rgb >> 16) as u8,
            g: (rgb >> 8) as u8,
            b: rgb as u8,
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Series colors, handed out in admission order. Its length bounds the
/// series cap, so live series never share a color.
pub const PALETTE: [Color; 8] = [
    Color::from_rgb(0x0072B2),
    Color::from_rgb(0xD55E00),
    Color::from_rgb(0x009E73),
    Color::from_rgb(0xE69F00),
    Color::from_rgb(0xCC79A7),
    Color::from_rgb(0x56B4E9),
    Color::from_rgb(0xF0E442),
    Color::from_rgb(0x95A5A6),
];

/// Hands out palette slots round-robin, skipping slots still in use.
#[derive(Debug, Default)]
pub(crate) struct ColorAllocator {
    next: usize,
}

impl ColorAllocator {
    pub fn allocate(&mut self, in_use: &[usize]) -> usize {
        let slot = (0..PALETTE.len())
            .map(|step| (self.next + step) % PALETTE.len())
            .find(|slot| !in_use.contains(slot))
            .unwrap_or(self.next % PALETTE.len());
        self.next = (slot + 1) % PALETTE.len();
        slot
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_as_hex() {
        assert_eq!(PALETTE[0].to_string(), "#0072B2");
        assert_eq!(PALETTE[7].to_string(), "#95A5A6");
    }

    #[test]
    fn allocation_skips_live_slots() {
        let mut colors = ColorAllocator::default();
        assert_eq!(colors.allocate(&[]), 0);
        assert_eq!(colors.allocate(&[0]), 1);
        assert_eq!(colors.allocate(&[0, 1]), 2);
        // Slot 1 was freed: the next admission still moves forward.
        assert_eq!(colors.allocate(&[0, 2]), 3);
        // Wrapping around skips slot 0, which is still shown.
        let in_use = [0, 2, 3, 4, 5, 6, 7];
        colors.next = 6;
        assert_eq!(colors.allocate(&in_use), 1);
    }
}
