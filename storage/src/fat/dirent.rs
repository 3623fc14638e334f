use super::{Cluster, name::ShortName};

/// Size of a directory entry in bytes (always 32 bytes)
pub const DIR_ENTRY_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Directory entry attributes
pub struct Attributes(u8);

impl Attributes {
    /// Read-only attribute
    pub const READ_ONLY: u8 = 0x01;
    /// Hidden attribute
    pub const HIDDEN: u8 = 0x02;
    /// System attribute
    pub const SYSTEM: u8 = 0x04;
    /// Volume ID attribute
    pub const VOLUME_ID: u8 = 0x08;
    /// Directory attribute
    pub const DIRECTORY: u8 = 0x10;
    /// Archive attribute
    pub const ARCHIVE: u8 = 0x20;
    /// Long file name attribute
    pub const LONG_NAME: u8 = Self::READ_ONLY | Self::HIDDEN | Self::SYSTEM | Self::VOLUME_ID;
    /// Long file name mask
    pub const LONG_NAME_MASK: u8 = Self::LONG_NAME | Self::DIRECTORY | Self::ARCHIVE;

    #[must_use]
    #[inline]
    pub const fn new(attributes: u8) -> Self {
        Self(attributes)
    }

    #[must_use]
    #[inline]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    #[must_use]
    #[inline]
    pub const fn is_read_only(&self) -> bool {
        self.0 & Self::READ_ONLY != 0
    }

    #[must_use]
    #[inline]
    pub const fn is_hidden(&self) -> bool {
        self.0 & Self::HIDDEN != 0
    }

    #[must_use]
    #[inline]
    pub const fn is_system(&self) -> bool {
        self.0 & Self::SYSTEM != 0
    }

    #[must_use]
    #[inline]
    pub const fn is_volume_id(&self) -> bool {
        self.0 & Self::VOLUME_ID != 0
    }

    #[must_use]
    #[inline]
    pub const fn is_directory(&self) -> bool {
        self.0 & Self::DIRECTORY != 0
    }

    #[must_use]
    #[inline]
    pub const fn is_archive(&self) -> bool {
        self.0 & Self::ARCHIVE != 0
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is a long file name record
    pub const fn is_long_name(&self) -> bool {
        (self.0 & Self::LONG_NAME_MASK) == Self::LONG_NAME
    }
}

/// FAT directory entry
///
/// Timestamps and reserved fields are kept as raw values so that an entry
/// round-trips through [`DirEntry::from_bytes`] and [`DirEntry::to_bytes`] unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    /// 8.3 name, without the dot
    name: ShortName,
    /// File attributes
    attr: u8,
    /// Reserved for Windows NT
    nt_res: u8,
    /// Creation time, in tenths of a second
    creation_time_tenths: u8,
    /// Creation time
    creation_time: u16,
    /// Creation date
    creation_date: u16,
    /// Last access date
    last_access_date: u16,
    /// High word of first cluster number
    first_cluster_high: u16,
    /// Last modification time
    write_time: u16,
    /// Last modification date
    write_date: u16,
    /// Low word of first cluster number
    first_cluster_low: u16,
    /// File size in bytes
    file_size: u32,
}

#[inline]
fn le_u16(bytes: &[u8; DIR_ENTRY_SIZE], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

impl DirEntry {
    /// Deleted entry marker (first byte)
    pub const DELETED_ENTRY: u8 = 0xE5;
    /// End of directory marker (first byte)
    pub const END_OF_ENTRIES: u8 = 0x00;

    #[must_use]
    /// Decodes an on-disk directory entry.
    pub fn from_bytes(bytes: &[u8; DIR_ENTRY_SIZE]) -> Self {
        let mut name = [0; ShortName::LEN];
        name.copy_from_slice(&bytes[0..11]);
        Self {
            name: ShortName::from_raw(name),
            attr: bytes[11],
            nt_res: bytes[12],
            creation_time_tenths: bytes[13],
            creation_time: le_u16(bytes, 14),
            creation_date: le_u16(bytes, 16),
            last_access_date: le_u16(bytes, 18),
            first_cluster_high: le_u16(bytes, 20),
            write_time: le_u16(bytes, 22),
            write_date: le_u16(bytes, 24),
            first_cluster_low: le_u16(bytes, 26),
            file_size: u32::from_le_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]),
        }
    }

    #[must_use]
    /// Encodes the entry into its on-disk representation.
    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut bytes = [0; DIR_ENTRY_SIZE];
        bytes[0..11].copy_from_slice(self.name.as_bytes());
        bytes[11] = self.attr;
        bytes[12] = self.nt_res;
        bytes[13] = self.creation_time_tenths;
        bytes[14..16].copy_from_slice(&self.creation_time.to_le_bytes());
        bytes[16..18].copy_from_slice(&self.creation_date.to_le_bytes());
        bytes[18..20].copy_from_slice(&self.last_access_date.to_le_bytes());
        bytes[20..22].copy_from_slice(&self.first_cluster_high.to_le_bytes());
        bytes[22..24].copy_from_slice(&self.write_time.to_le_bytes());
        bytes[24..26].copy_from_slice(&self.write_date.to_le_bytes());
        bytes[26..28].copy_from_slice(&self.first_cluster_low.to_le_bytes());
        bytes[28..32].copy_from_slice(&self.file_size.to_le_bytes());
        bytes
    }

    #[must_use]
    #[inline]
    /// Returns true if this slot terminates the directory
    pub const fn is_end_of_directory(&self) -> bool {
        self.name.as_bytes()[0] == Self::END_OF_ENTRIES
    }

    #[must_use]
    #[inline]
    pub const fn is_deleted(&self) -> bool {
        self.name.as_bytes()[0] == Self::DELETED_ENTRY
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is neither a terminator nor a tombstone
    pub const fn is_valid(&self) -> bool {
        !self.is_end_of_directory() && !self.is_deleted()
    }

    #[must_use]
    #[inline]
    pub const fn is_directory(&self) -> bool {
        Attributes::new(self.attr).is_directory()
    }

    #[must_use]
    #[inline]
    pub const fn is_volume_id(&self) -> bool {
        Attributes::new(self.attr).is_volume_id()
    }

    #[must_use]
    #[inline]
    pub const fn is_long_name(&self) -> bool {
        Attributes::new(self.attr).is_long_name()
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is a regular file
    pub const fn is_file(&self) -> bool {
        self.is_valid() && !self.is_directory() && !self.is_volume_id()
    }

    #[must_use]
    #[inline]
    pub const fn name(&self) -> ShortName {
        self.name
    }

    #[inline]
    pub const fn set_name(&mut self, name: ShortName) {
        self.name = name;
    }

    #[must_use]
    #[inline]
    pub const fn attributes(&self) -> Attributes {
        Attributes::new(self.attr)
    }

    #[must_use]
    #[inline]
    pub const fn first_cluster(&self) -> Cluster {
        Cluster::new(((self.first_cluster_high as u32) << 16) | self.first_cluster_low as u32)
    }

    #[inline]
    pub const fn set_first_cluster(&mut self, cluster: Cluster) {
        self.first_cluster_high = (cluster.value() >> 16) as u16;
        self.first_cluster_low = (cluster.value() & 0xFFFF) as u16;
    }

    #[must_use]
    #[inline]
    pub const fn file_size(&self) -> u32 {
        self.file_size
    }

    #[inline]
    pub const fn set_file_size(&mut self, file_size: u32) {
        self.file_size = file_size;
    }

    #[must_use]
    #[inline]
    /// Raw DOS date of the last modification
    pub const fn write_date(&self) -> u16 {
        self.write_date
    }

    #[must_use]
    #[inline]
    /// Raw DOS time of the last modification
    pub const fn write_time(&self) -> u16 {
        self.write_time
    }
}
