use super::{FatError, FatResult};
use crate::{BlockDevice, dev};

/// Size of the boot sector region read at the start of the volume.
pub const BOOT_SECTOR_SIZE: usize = 512;

#[inline]
fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

#[inline]
fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// FAT32 boot sector, holding the BIOS Parameter Block (BPB)
/// and the extended boot record.
///
/// The engine only ever reads it: the boot sector is never written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSector {
    /// Jump instruction to the boot code.
    jmp: [u8; 3],
    /// Name of the formatting tool.
    oem_id: [u8; 8],
    /// Bytes per sector.
    ///
    /// This field is either 512, 1024, 2048, or 4096.
    bytes_per_sector: u16,
    /// Sectors per cluster.
    sectors_per_cluster: u8,
    /// Reserved sectors, boot sector included.
    reserved_sectors: u16,
    /// Number of FATs.
    fat_count: u8,
    /// Always 0 on FAT32.
    root_entries: u16,
    /// Total sectors in the file system.
    ///
    /// If the total number of sectors exceeds `u16::MAX`, this field is set to 0
    /// and one should use `total_sectors_large` instead.
    total_sectors: u16,
    /// Driver type.
    ///
    /// Example: 0xF8 for fixed disk and 0xF0 for removable disk.
    media_descriptor: u8,
    /// Sectors per track.
    sectors_per_track: u16,
    /// Number of heads.
    heads: u16,
    /// Hidden sectors.
    hidden_sectors: u32,
    /// Total sectors in the file system.
    ///
    /// This field is used when `total_sectors` is set to 0.
    total_sectors_large: u32,
    /// Sectors per FAT.
    sectors_per_fat: u32,
    /// First cluster of the root directory.
    root_cluster: u32,
    /// Sector of the `FSInfo` structure.
    fs_info_sector: u16,
    /// Sector of the backup boot sector.
    backup_boot_sector: u16,
    /// Logical drive number.
    drive_number: u8,
    /// Extended boot signature, 0x29 when the following fields are valid.
    boot_flag: u8,
    /// Volume serial number.
    volume_id: u32,
    /// Volume label.
    volume_label: [u8; 11],
    /// File system type.
    fs_type: [u8; 8],
    /// Boot sector signature.
    signature: u16,
}

impl Default for BootSector {
    fn default() -> Self {
        Self::new()
    }
}

impl BootSector {
    /// Boot sector signature, stored as `0x55 0xAA` at offset 510.
    pub const SIGNATURE: u16 = 0xAA55;
    /// Extended boot signature.
    pub const EXTENDED_BOOT_SIGNATURE: u8 = 0x29;

    #[must_use]
    /// Creates a boot sector with the usual FAT32 defaults and an empty geometry.
    pub const fn new() -> Self {
        Self {
            jmp: [0xEB, 0x58, 0x90],
            oem_id: *b"MSWIN4.1",
            bytes_per_sector: 512,
            sectors_per_cluster: 8,
            reserved_sectors: 32,
            fat_count: 2,
            root_entries: 0,
            total_sectors: 0,
            media_descriptor: 0xF8,
            sectors_per_track: 32,
            heads: 64,
            hidden_sectors: 0,
            total_sectors_large: 0,
            sectors_per_fat: 0,
            root_cluster: 2,
            fs_info_sector: 1,
            backup_boot_sector: 6,
            drive_number: 0x80,
            boot_flag: Self::EXTENDED_BOOT_SIGNATURE,
            volume_id: 0,
            volume_label: *b"NO NAME    ",
            fs_type: *b"FAT32   ",
            signature: Self::SIGNATURE,
        }
    }

    /// Reads and validates the boot sector at the start of the device.
    pub fn read<D: BlockDevice>(device: &mut D) -> FatResult<Self> {
        let mut sector = [0; BOOT_SECTOR_SIZE];
        dev::read_at(device, 0, &mut sector)?;
        Self::parse(&sector)
    }

    /// Decodes and validates an in-memory boot sector.
    pub fn parse(sector: &[u8; BOOT_SECTOR_SIZE]) -> FatResult<Self> {
        let mut jmp = [0; 3];
        jmp.copy_from_slice(&sector[0..3]);
        let mut oem_id = [0; 8];
        oem_id.copy_from_slice(&sector[3..11]);
        let mut volume_label = [0; 11];
        volume_label.copy_from_slice(&sector[71..82]);
        let mut fs_type = [0; 8];
        fs_type.copy_from_slice(&sector[82..90]);

        let bs = Self {
            jmp,
            oem_id,
            bytes_per_sector: le_u16(sector, 11),
            sectors_per_cluster: sector[13],
            reserved_sectors: le_u16(sector, 14),
            fat_count: sector[16],
            root_entries: le_u16(sector, 17),
            total_sectors: le_u16(sector, 19),
            media_descriptor: sector[21],
            sectors_per_track: le_u16(sector, 24),
            heads: le_u16(sector, 26),
            hidden_sectors: le_u32(sector, 28),
            total_sectors_large: le_u32(sector, 32),
            sectors_per_fat: le_u32(sector, 36),
            root_cluster: le_u32(sector, 44),
            fs_info_sector: le_u16(sector, 48),
            backup_boot_sector: le_u16(sector, 50),
            drive_number: sector[64],
            boot_flag: sector[66],
            volume_id: le_u32(sector, 67),
            volume_label,
            fs_type,
            signature: le_u16(sector, 510),
        };

        bs.validate()?;
        Ok(bs)
    }

    fn validate(&self) -> FatResult<()> {
        if self.signature != Self::SIGNATURE {
            log::warn!("Invalid boot sector signature: {:#06x}", self.signature);
            return Err(FatError::CorruptVolume);
        }
        if !matches!(self.bytes_per_sector, 512 | 1024 | 2048 | 4096) {
            log::warn!("Invalid bytes per sector: {}", self.bytes_per_sector);
            return Err(FatError::CorruptVolume);
        }
        if !self.sectors_per_cluster.is_power_of_two() {
            log::warn!("Invalid sectors per cluster: {}", self.sectors_per_cluster);
            return Err(FatError::CorruptVolume);
        }
        if self.fat_count == 0 || self.sectors_per_fat == 0 {
            log::warn!(
                "Empty allocation table: {} copies of {} sectors",
                self.fat_count,
                self.sectors_per_fat
            );
            return Err(FatError::CorruptVolume);
        }
        if self.root_cluster < 2 {
            log::warn!("Invalid root cluster: {}", self.root_cluster);
            return Err(FatError::CorruptVolume);
        }

        let data_start = u64::from(self.reserved_sectors)
            + u64::from(self.fat_count) * u64::from(self.sectors_per_fat);
        let data_sectors = u64::from(self.total_sectors()).saturating_sub(data_start);
        if data_sectors < u64::from(self.sectors_per_cluster) {
            log::warn!(
                "Data region starts at sector {data_start}, volume only has {} sectors",
                self.total_sectors()
            );
            return Err(FatError::CorruptVolume);
        }

        Ok(())
    }

    /// Encodes the boot sector back into its on-disk representation.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; BOOT_SECTOR_SIZE] {
        let mut sector = [0; BOOT_SECTOR_SIZE];
        sector[0..3].copy_from_slice(&self.jmp);
        sector[3..11].copy_from_slice(&self.oem_id);
        sector[11..13].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        sector[13] = self.sectors_per_cluster;
        sector[14..16].copy_from_slice(&self.reserved_sectors.to_le_bytes());
        sector[16] = self.fat_count;
        sector[17..19].copy_from_slice(&self.root_entries.to_le_bytes());
        sector[19..21].copy_from_slice(&self.total_sectors.to_le_bytes());
        sector[21] = self.media_descriptor;
        sector[24..26].copy_from_slice(&self.sectors_per_track.to_le_bytes());
        sector[26..28].copy_from_slice(&self.heads.to_le_bytes());
        sector[28..32].copy_from_slice(&self.hidden_sectors.to_le_bytes());
        sector[32..36].copy_from_slice(&self.total_sectors_large.to_le_bytes());
        sector[36..40].copy_from_slice(&self.sectors_per_fat.to_le_bytes());
        sector[44..48].copy_from_slice(&self.root_cluster.to_le_bytes());
        sector[48..50].copy_from_slice(&self.fs_info_sector.to_le_bytes());
        sector[50..52].copy_from_slice(&self.backup_boot_sector.to_le_bytes());
        sector[64] = self.drive_number;
        sector[66] = self.boot_flag;
        sector[67..71].copy_from_slice(&self.volume_id.to_le_bytes());
        sector[71..82].copy_from_slice(&self.volume_label);
        sector[82..90].copy_from_slice(&self.fs_type);
        sector[510..512].copy_from_slice(&self.signature.to_le_bytes());
        sector
    }

    #[must_use]
    #[inline]
    pub const fn with_bytes_per_sector(mut self, bytes_per_sector: u16) -> Self {
        self.bytes_per_sector = bytes_per_sector;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_sectors_per_cluster(mut self, sectors_per_cluster: u8) -> Self {
        self.sectors_per_cluster = sectors_per_cluster;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_reserved_sectors(mut self, reserved_sectors: u16) -> Self {
        self.reserved_sectors = reserved_sectors;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_fat_count(mut self, fat_count: u8) -> Self {
        self.fat_count = fat_count;
        self
    }

    #[must_use]
    #[inline]
    /// Sets the total sector count, always through the 32-bit field.
    pub const fn with_total_sectors(mut self, total_sectors: u32) -> Self {
        self.total_sectors = 0;
        self.total_sectors_large = total_sectors;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_sectors_per_fat(mut self, sectors_per_fat: u32) -> Self {
        self.sectors_per_fat = sectors_per_fat;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_root_cluster(mut self, root_cluster: u32) -> Self {
        self.root_cluster = root_cluster;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_media_descriptor(mut self, media_descriptor: u8) -> Self {
        self.media_descriptor = media_descriptor;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_volume_id(mut self, volume_id: u32) -> Self {
        self.volume_id = volume_id;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_volume_label(mut self, volume_label: [u8; 11]) -> Self {
        self.volume_label = volume_label;
        self
    }

    #[must_use]
    #[inline]
    /// Returns the number of bytes per sector.
    pub const fn bytes_per_sector(&self) -> u16 {
        self.bytes_per_sector
    }

    #[must_use]
    #[inline]
    /// Returns the number of sectors per cluster.
    pub const fn sectors_per_cluster(&self) -> u8 {
        self.sectors_per_cluster
    }

    #[must_use]
    #[inline]
    /// Returns the number of reserved sectors.
    pub const fn reserved_sectors(&self) -> u16 {
        self.reserved_sectors
    }

    #[must_use]
    #[inline]
    /// Returns the number of FATs.
    pub const fn fat_count(&self) -> u8 {
        self.fat_count
    }

    #[must_use]
    #[inline]
    /// Returns the number of root directory entries (0 on FAT32).
    pub const fn root_entries(&self) -> u16 {
        self.root_entries
    }

    #[must_use]
    #[inline]
    /// Returns the number of sectors in the file system.
    pub const fn total_sectors(&self) -> u32 {
        if self.total_sectors_large != 0 {
            self.total_sectors_large
        } else {
            self.total_sectors as u32
        }
    }

    #[must_use]
    #[inline]
    /// Returns the media descriptor.
    pub const fn media_descriptor(&self) -> u8 {
        self.media_descriptor
    }

    #[must_use]
    #[inline]
    /// Returns the number of sectors per FAT.
    pub const fn sectors_per_fat(&self) -> u32 {
        self.sectors_per_fat
    }

    #[must_use]
    #[inline]
    /// Returns the first cluster of the root directory.
    pub const fn root_cluster(&self) -> u32 {
        self.root_cluster
    }

    #[must_use]
    #[inline]
    pub const fn fs_info_sector(&self) -> u16 {
        self.fs_info_sector
    }

    #[must_use]
    #[inline]
    pub const fn backup_boot_sector(&self) -> u16 {
        self.backup_boot_sector
    }

    #[must_use]
    #[inline]
    pub const fn oem_id(&self) -> [u8; 8] {
        self.oem_id
    }

    #[must_use]
    #[inline]
    /// Returns the volume serial number.
    pub const fn volume_id(&self) -> u32 {
        self.volume_id
    }

    #[must_use]
    #[inline]
    pub const fn volume_label(&self) -> [u8; 11] {
        self.volume_label
    }

    #[must_use]
    #[inline]
    pub const fn fs_type(&self) -> [u8; 8] {
        self.fs_type
    }

    #[must_use]
    #[inline]
    pub const fn signature(&self) -> u16 {
        self.signature
    }
}
