//! Memory map and address space records.
//!
//! A [`MemoryMap`] collects the access-permission view of a loaded image: one
//! [`MemoryRegion`] per loadable container unit (ELF `PT_LOAD`, PE section, Mach-O
//! segment). Regions are kept in container traversal order and may overlap; two
//! containers expressing the same area simply produce duplicate regions.
//!
//! An [`AddressSpace`] names the linear interval covering the union of loadable
//! memory of one container (`"ram"` for ELF, `"image"` for PE and Mach-O).

/// Access permissions for a virtual address range.
///
/// Regions carry no bytes; the concrete mapping lives in the
/// [`MemoryImage`](crate::program::MemoryImage).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryRegion {
    /// First virtual address covered by this region
    pub start: u64,
    /// Size of the region in bytes
    pub size: u64,
    /// Region may be read at runtime
    pub readable: bool,
    /// Region may be written at runtime
    pub writable: bool,
    /// Region may be executed at runtime
    pub executable: bool,
}

/// Ordered collection of [`MemoryRegion`] records for one program.
#[derive(Debug, Default, Clone)]
pub struct MemoryMap {
    regions: Vec<MemoryRegion>,
}

impl MemoryMap {
    /// Append a region. No overlap or ordering constraints are enforced.
    pub fn add_region(&mut self, region: MemoryRegion) {
        self.regions.push(region);
    }

    /// All regions, in the order the container parser emitted them.
    #[must_use]
    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }
}

/// A named linear interval covering the union of loadable memory of one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpace {
    name: String,
    base: u64,
    size: u64,
}

impl AddressSpace {
    /// Create a new address space.
    ///
    /// ## Arguments
    /// * 'name' - Space name, e.g. `"ram"` or `"image"`
    /// * 'base' - Lowest covered virtual address
    /// * 'size' - Length of the interval in bytes
    #[must_use]
    pub fn new(name: impl Into<String>, base: u64, size: u64) -> AddressSpace {
        AddressSpace {
            name: name.into(),
            base,
            size,
        }
    }

    /// The space name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowest covered virtual address.
    #[must_use]
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Length of the interval in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_keep_insertion_order() {
        let mut map = MemoryMap::default();
        map.add_region(MemoryRegion {
            start: 0x2000,
            size: 0x1000,
            readable: true,
            writable: true,
            executable: false,
        });
        map.add_region(MemoryRegion {
            start: 0x1000,
            size: 0x1000,
            readable: true,
            writable: false,
            executable: true,
        });

        assert_eq!(map.regions().len(), 2);
        assert_eq!(map.regions()[0].start, 0x2000);
        assert_eq!(map.regions()[1].start, 0x1000);
    }

    #[test]
    fn address_space_accessors() {
        let space = AddressSpace::new("ram", 0x400000, 0x1000);
        assert_eq!(space.name(), "ram");
        assert_eq!(space.base(), 0x400000);
        assert_eq!(space.size(), 0x1000);
    }
}
