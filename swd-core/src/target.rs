// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Target descriptors binding a concrete MCU's memory layout, flash
//! controller variant and wire-level retry bounds together into a single
//! immutable record passed around by `swd-proto`.

use core::fmt;

/// A contiguous region of addressable memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// First address in the region.
    pub base: u32,

    /// Size of the region in bytes.
    pub size: u32,
}

impl MemoryRegion {
    /// Creates a new memory region.
    pub const fn new(base: u32, size: u32) -> Self {
        Self { base, size }
    }

    /// Returns the exclusive end address of the region.
    pub const fn end(&self) -> u32 {
        self.base + self.size
    }

    /// Returns whether `addr` falls within this region.
    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.end()
    }

    /// Returns whether the half-open byte range `[addr, addr+len)` is
    /// entirely contained within this region.
    pub const fn contains_range(&self, addr: u32, len: u32) -> bool {
        len != 0 && addr >= self.base && addr.saturating_add(len) <= self.end()
    }
}

/// One erase-granularity unit of flash: a page (uniform-size controllers)
/// or a sector (sector-size controllers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Offset of the segment from the start of flash.
    pub offset: u32,

    /// Size of the segment in bytes.
    pub size: u32,
}

impl Segment {
    /// Creates a new segment.
    pub const fn new(offset: u32, size: u32) -> Self {
        Self { offset, size }
    }

    /// Returns the exclusive end offset of the segment.
    pub const fn end(&self) -> u32 {
        self.offset + self.size
    }
}

/// Which flash controller variant a target implements.
///
/// The two STM32 families in scope use incompatible flash controllers:
/// F1 erases in uniform fixed-size pages addressed via `FLASH_AR`, while F4
/// erases in variable-size sectors selected by number in `FLASH_CR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashVariant {
    /// Uniform fixed-size page controller (STM32F1 family).
    UniformPage {
        /// Size of every page, in bytes.
        page_size: u32,
    },

    /// Variable-size sector controller (STM32F4 family).
    Sector {
        /// Segment table, smallest offset first.
        segments: &'static [Segment],
    },
}

impl FlashVariant {
    /// Returns the segment containing byte offset `offset` from the start
    /// of flash, if any.
    pub fn segment_containing(&self, offset: u32) -> Option<Segment> {
        match self {
            FlashVariant::UniformPage { page_size } => {
                let page_start = (offset / page_size) * page_size;
                Some(Segment::new(page_start, *page_size))
            }
            FlashVariant::Sector { segments } => segments
                .iter()
                .copied()
                .find(|s| offset >= s.offset && offset < s.end()),
        }
    }

    /// Returns every segment overlapping the half-open byte range
    /// `[offset, offset+len)`.
    pub fn segments_overlapping(&self, offset: u32, len: u32) -> SegmentIter<'_> {
        match self {
            FlashVariant::UniformPage { page_size } => SegmentIter::Uniform {
                page_size: *page_size,
                next: (offset / page_size) * page_size,
                end: offset.saturating_add(len),
            },
            FlashVariant::Sector { segments } => SegmentIter::Sector {
                segments,
                idx: 0,
                start: offset,
                end: offset.saturating_add(len),
            },
        }
    }
}

/// Iterator over the flash segments overlapping a byte range.
pub enum SegmentIter<'a> {
    Uniform { page_size: u32, next: u32, end: u32 },
    Sector {
        segments: &'a [Segment],
        idx: usize,
        start: u32,
        end: u32,
    },
}

impl Iterator for SegmentIter<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        match self {
            SegmentIter::Uniform { page_size, next, end } => {
                if *next >= *end {
                    return None;
                }
                let seg = Segment::new(*next, *page_size);
                *next += *page_size;
                Some(seg)
            }
            SegmentIter::Sector { segments, idx, start, end } => {
                while *idx < segments.len() {
                    let seg = segments[*idx];
                    *idx += 1;
                    if seg.end() > *start && seg.offset < *end {
                        return Some(seg);
                    }
                    if seg.offset >= *end {
                        break;
                    }
                }
                None
            }
        }
    }
}

/// STM32F411 sector table: 4x16 KiB + 1x64 KiB + 3x128 KiB.
static STM32F411_SECTORS: [Segment; 8] = [
    Segment::new(0x0000_0000, 16 * 1024),
    Segment::new(0x0000_4000, 16 * 1024),
    Segment::new(0x0000_8000, 16 * 1024),
    Segment::new(0x0000_C000, 16 * 1024),
    Segment::new(0x0001_0000, 64 * 1024),
    Segment::new(0x0002_0000, 128 * 1024),
    Segment::new(0x0004_0000, 128 * 1024),
    Segment::new(0x0006_0000, 128 * 1024),
];

/// Immutable record describing everything the protocol engine needs to
/// know about a concrete target, independent of any live session.
#[derive(Debug, Clone, Copy)]
pub struct TargetDescriptor {
    /// Human-readable target name, e.g. `"stm32f103"`.
    pub name: &'static str,

    /// SRAM region.
    pub sram: MemoryRegion,

    /// Flash region.
    pub flash: MemoryRegion,

    /// Flash controller variant and layout.
    pub flash_variant: FlashVariant,

    /// Maximum wire-level (ACK WAIT) retries before giving up on a single
    /// transfer.
    pub wait_retries: u32,

    /// Maximum polling retries while waiting for the flash controller's
    /// busy flag to clear.
    pub flash_busy_retries: u32,
}

impl TargetDescriptor {
    /// STM32F103 (uniform-page, Cortex-M3) target descriptor.
    pub const fn stm32f103() -> Self {
        Self {
            name: "stm32f103",
            sram: MemoryRegion::new(0x2000_0000, 20 * 1024),
            flash: MemoryRegion::new(0x0800_0000, 64 * 1024),
            flash_variant: FlashVariant::UniformPage { page_size: 1024 },
            wait_retries: 600,
            flash_busy_retries: 600,
        }
    }

    /// STM32F411 (sector, Cortex-M4) target descriptor.
    pub const fn stm32f411() -> Self {
        Self {
            name: "stm32f411",
            sram: MemoryRegion::new(0x2000_0000, 128 * 1024),
            flash: MemoryRegion::new(0x0800_0000, 512 * 1024),
            flash_variant: FlashVariant::Sector {
                segments: &STM32F411_SECTORS,
            },
            wait_retries: 600,
            flash_busy_retries: 60_000,
        }
    }

    /// Looks up a built-in target descriptor by name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "stm32f103" => Some(Self::stm32f103()),
            "stm32f411" => Some(Self::stm32f411()),
            _ => None,
        }
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (flash: {} KB @ 0x{:08X}, sram: {} KB @ 0x{:08X})",
            self.name,
            self.flash.size / 1024,
            self.flash.base,
            self.sram.size / 1024,
            self.sram.base,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_page_segment_containing() {
        let v = FlashVariant::UniformPage { page_size: 1024 };
        let seg = v.segment_containing(1500).unwrap();
        assert_eq!(seg.offset, 1024);
        assert_eq!(seg.size, 1024);
    }

    #[test]
    fn sector_segment_containing() {
        let v = FlashVariant::Sector {
            segments: &STM32F411_SECTORS,
        };
        let seg = v.segment_containing(0x1_0500).unwrap();
        assert_eq!(seg.offset, 0x1_0000);
        assert_eq!(seg.size, 64 * 1024);
    }

    #[test]
    fn sector_segments_overlapping_spans_multiple() {
        let v = FlashVariant::Sector {
            segments: &STM32F411_SECTORS,
        };
        let segs: Vec<_> = v.segments_overlapping(0x0000_C000, 0x1_4000).collect();
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].offset, 0x0000_C000);
        assert_eq!(segs[1].offset, 0x0001_0000);
        assert_eq!(segs[2].offset, 0x0002_0000);
    }

    #[test]
    fn stm32f103_descriptor_matches_expected_layout() {
        let d = TargetDescriptor::stm32f103();
        assert_eq!(d.flash.size, 64 * 1024);
        assert_eq!(d.sram.size, 20 * 1024);
        assert_eq!(d.wait_retries, 600);
    }

    #[test]
    fn stm32f411_descriptor_matches_expected_layout() {
        let d = TargetDescriptor::stm32f411();
        assert_eq!(d.flash.size, 512 * 1024);
        assert_eq!(d.flash_busy_retries, 60_000);
    }
}
