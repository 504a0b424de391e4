//! Concrete byte mapping of a loaded image.
//!
//! The [`MemoryImage`] is a sparse map of the virtual address space: an ordered sequence
//! of [`ImageSegment`]s, each a run of bytes at a fixed start address. Container parsers
//! append one segment per file-backed mapping and one zero-filled segment per BSS tail.
//!
//! Lookups return the *first* segment strictly containing an address; segments are never
//! coalesced and overlaps are not rejected here. A multi-byte access succeeds only when
//! the full width lies inside a single segment; reads and writes never span segments.

/// A run of bytes mapped at a fixed virtual address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSegment {
    start: u64,
    data: Vec<u8>,
}

impl ImageSegment {
    /// First virtual address of the segment.
    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    /// The mapped bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn contains(&self, address: u64, width: u64) -> bool {
        // end computed with checked arithmetic so a segment placed at the top of the
        // address space cannot wrap into a false match
        let Some(end) = self.start.checked_add(self.data.len() as u64) else {
            return false;
        };
        address >= self.start && address.checked_add(width).is_some_and(|tail| tail <= end)
    }
}

/// Sparse virtual-address-space byte map.
///
/// All multi-byte primitives are little-endian.
///
/// # Examples
///
/// ```rust
/// use binscope::program::MemoryImage;
///
/// let mut image = MemoryImage::default();
/// image.map_segment(0x1000, vec![0x78, 0x56, 0x34, 0x12]);
/// image.zero_fill(0x1004, 4);
///
/// assert_eq!(image.read_u32(0x1000), Some(0x12345678));
/// assert_eq!(image.read_u32(0x1004), Some(0));
/// // the read spans two segments, so it misses
/// assert_eq!(image.read_u32(0x1002), None);
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryImage {
    segments: Vec<ImageSegment>,
}

impl MemoryImage {
    /// Append a segment of concrete bytes at `start`.
    pub fn map_segment(&mut self, start: u64, bytes: Vec<u8>) {
        self.segments.push(ImageSegment { start, data: bytes });
    }

    /// Append a segment of `size` zero bytes at `start`.
    pub fn zero_fill(&mut self, start: u64, size: u64) {
        self.segments.push(ImageSegment {
            start,
            data: vec![0; size as usize],
        });
    }

    /// All segments, in mapping order.
    #[must_use]
    pub fn segments(&self) -> &[ImageSegment] {
        &self.segments
    }

    /// Read a little-endian u32. Returns `None` when the full width does not lie
    /// inside a single segment.
    #[must_use]
    pub fn read_u32(&self, address: u64) -> Option<u32> {
        let seg = self.find_segment(address, 4)?;
        let offset = (address - seg.start) as usize;
        Some(u32::from_le_bytes(
            seg.data[offset..offset + 4].try_into().ok()?,
        ))
    }

    /// Read a little-endian u64. Returns `None` when the full width does not lie
    /// inside a single segment.
    #[must_use]
    pub fn read_u64(&self, address: u64) -> Option<u64> {
        let seg = self.find_segment(address, 8)?;
        let offset = (address - seg.start) as usize;
        Some(u64::from_le_bytes(
            seg.data[offset..offset + 8].try_into().ok()?,
        ))
    }

    /// Write a little-endian u32. Returns `false` when the full width does not lie
    /// inside a single segment; the image is unchanged in that case.
    pub fn write_u32(&mut self, address: u64, value: u32) -> bool {
        let Some(seg) = self.find_segment_mut(address, 4) else {
            return false;
        };
        let offset = (address - seg.start) as usize;
        seg.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        true
    }

    /// Write a little-endian u64. Returns `false` when the full width does not lie
    /// inside a single segment; the image is unchanged in that case.
    pub fn write_u64(&mut self, address: u64, value: u64) -> bool {
        let Some(seg) = self.find_segment_mut(address, 8) else {
            return false;
        };
        let offset = (address - seg.start) as usize;
        seg.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        true
    }

    fn find_segment(&self, address: u64, width: u64) -> Option<&ImageSegment> {
        self.segments.iter().find(|seg| seg.contains(address, width))
    }

    fn find_segment_mut(&mut self, address: u64, width: u64) -> Option<&mut ImageSegment> {
        self.segments
            .iter_mut()
            .find(|seg| seg.contains(address, width))
    }
}
