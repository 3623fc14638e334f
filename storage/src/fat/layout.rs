//! Translation of FAT32 logical addresses (FAT entries, clusters) into byte offsets.
use super::{Cluster, bs::BootSector};

/// Geometry of a mounted volume, derived from its boot sector.
///
/// All offsets are in bytes from the start of the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    bytes_per_sector: u64,
    sectors_per_cluster: u64,
    reserved_sectors: u64,
    fat_count: u64,
    sectors_per_fat: u64,
    total_sectors: u64,
    root_cluster: u32,
}

impl Layout {
    #[must_use]
    /// Derives the geometry of a boot sector that already passed validation.
    pub(crate) fn new(boot_sector: &BootSector) -> Self {
        Self {
            bytes_per_sector: u64::from(boot_sector.bytes_per_sector()),
            sectors_per_cluster: u64::from(boot_sector.sectors_per_cluster()),
            reserved_sectors: u64::from(boot_sector.reserved_sectors()),
            fat_count: u64::from(boot_sector.fat_count()),
            sectors_per_fat: u64::from(boot_sector.sectors_per_fat()),
            total_sectors: u64::from(boot_sector.total_sectors()),
            root_cluster: boot_sector.root_cluster(),
        }
    }

    #[must_use]
    #[inline]
    pub const fn bytes_per_sector(&self) -> u64 {
        self.bytes_per_sector
    }

    #[must_use]
    #[inline]
    pub const fn root_cluster(&self) -> Cluster {
        Cluster::new(self.root_cluster)
    }

    #[must_use]
    #[inline]
    pub const fn cluster_size_bytes(&self) -> u64 {
        self.sectors_per_cluster * self.bytes_per_sector
    }

    #[must_use]
    #[inline]
    /// Start of the first FAT copy.
    pub const fn fat_region_offset(&self) -> u64 {
        self.reserved_sectors * self.bytes_per_sector
    }

    #[must_use]
    #[inline]
    pub const fn fat_size_bytes(&self) -> u64 {
        self.sectors_per_fat * self.bytes_per_sector
    }

    #[must_use]
    #[inline]
    /// Start of cluster 2, right after the last FAT copy.
    pub const fn data_region_offset(&self) -> u64 {
        self.fat_region_offset() + self.fat_count * self.fat_size_bytes()
    }

    #[must_use]
    #[inline]
    /// Position of the 4-byte entry of `cluster` in the first FAT copy.
    pub const fn fat_entry_offset(&self, cluster: Cluster) -> u64 {
        self.fat_region_offset() + cluster.value() as u64 * 4
    }

    #[must_use]
    #[inline]
    /// Position of the first byte of `cluster`.
    ///
    /// Only meaningful for data clusters (2 and above).
    pub const fn cluster_byte_offset(&self, cluster: Cluster) -> u64 {
        debug_assert!(cluster.value() >= 2);
        let index = cluster.value().saturating_sub(2) as u64;
        self.data_region_offset() + index * self.cluster_size_bytes()
    }

    #[must_use]
    #[inline]
    /// Number of clusters in the data region.
    pub const fn data_cluster_count(&self) -> u32 {
        let data_sectors = self
            .total_sectors
            .saturating_sub(self.data_region_offset() / self.bytes_per_sector);
        let count = data_sectors / self.sectors_per_cluster;
        if count > u32::MAX as u64 {
            u32::MAX
        } else {
            count as u32
        }
    }

    #[must_use]
    #[inline]
    /// Exclusive upper bound of usable cluster numbers.
    ///
    /// This is limited both by the data region and by the number of entries
    /// a single FAT copy can hold.
    pub const fn cluster_bound(&self) -> u32 {
        let by_data = self.data_cluster_count() as u64 + 2;
        let by_fat = self.fat_size_bytes() / 4;
        let bound = if by_data < by_fat { by_data } else { by_fat };
        if bound > Cluster::MASK as u64 {
            Cluster::MASK
        } else {
            bound as u32
        }
    }
}
