//! FAT32 engine operating on the root directory of an offline volume image.
//!
//! All operations go through [`FatFs`], which owns the backing device and the
//! geometry decoded once from the boot sector.
//!
//! Mutating operations write to the device as they go and are not atomic:
//! an I/O error midway may leave allocated clusters unreferenced, but never a
//! directory entry pointing at a partially built chain.
use crate::{BlockDevice, BlockDeviceError, dev};
use thiserror::Error;

pub mod bs;
pub mod dir;
pub mod dirent;
#[expect(clippy::module_inception, reason = "FS is named after this table")]
pub mod fat;
pub mod file;
pub mod layout;
pub mod name;

use bs::BootSector;
use dir::DirSlot;
use dirent::DirEntry;
use fat::{ChainCursor, FatEntries};
use file::FileReader;
use layout::Layout;
use name::ShortName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// A cluster number, as stored in directory entries and FAT entries.
pub struct Cluster(u32);

impl Cluster {
    /// Marks an empty file in a directory entry, or a free FAT entry.
    pub const FREE: Self = Self(0);
    /// First cluster of the data region.
    pub const FIRST: Self = Self(2);
    /// FAT32 entries only use their lower 28 bits.
    pub const MASK: u32 = 0x0FFF_FFFF;

    #[must_use]
    #[inline]
    pub const fn new(cluster: u32) -> Self {
        Self(cluster)
    }

    #[must_use]
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }

    #[must_use]
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.0 >= 2 && self.0 <= 0x0FFF_FFF6
    }

    #[must_use]
    #[inline]
    pub const fn is_end_of_chain(&self) -> bool {
        self.0 & Self::MASK >= 0x0FFF_FFF8
    }

    #[must_use]
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & Self::MASK == 0x0FFF_FFF7
    }

    #[must_use]
    #[inline]
    pub const fn is_free(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
/// Error type for FAT filesystem operations
pub enum FatError {
    #[error("I/O error: {0}")]
    Io(#[from] BlockDeviceError),
    #[error("Corrupted volume")]
    CorruptVolume,
    #[error("Invalid file name")]
    InvalidName,
    #[error("File not found")]
    NotFound,
    #[error("File already exists")]
    AlreadyExists,
    #[error("Root directory is full")]
    DirectoryFull,
    #[error("No free cluster left on the volume")]
    VolumeFull,
    #[error("Not a regular file")]
    NotAFile,
}

pub type FatResult<T> = Result<T, FatError>;

/// A FAT32 volume stored on a block device.
pub struct FatFs<D: BlockDevice> {
    device: D,
    boot_sector: BootSector,
    layout: Layout,
}

impl<D: BlockDevice> FatFs<D> {
    /// Mounts the volume stored on `device`.
    ///
    /// The boot sector is read and validated once here; every later operation
    /// reuses the decoded geometry.
    pub fn new(mut device: D) -> FatResult<Self> {
        let boot_sector = BootSector::read(&mut device)?;
        let layout = Layout::new(&boot_sector);

        let root = boot_sector.root_cluster();
        if root >= layout.cluster_bound() {
            log::warn!(
                "Root cluster {root} is outside of the FAT (bound {})",
                layout.cluster_bound()
            );
            return Err(FatError::CorruptVolume);
        }

        log::debug!(
            "Mounted FAT32 volume: {} data clusters of {} bytes, root at cluster {root}",
            layout.data_cluster_count(),
            layout.cluster_size_bytes(),
        );

        Ok(Self {
            device,
            boot_sector,
            layout,
        })
    }

    #[must_use]
    #[inline]
    pub const fn boot_sector(&self) -> &BootSector {
        &self.boot_sector
    }

    #[must_use]
    #[inline]
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    #[must_use]
    #[inline]
    /// Unmounts the volume and gives the device back.
    pub fn into_inner(self) -> D {
        self.device
    }

    #[must_use]
    #[inline]
    const fn root(&self) -> Cluster {
        self.layout.root_cluster()
    }

    fn read_bytes(&mut self, offset: u64, dst: &mut [u8]) -> FatResult<()> {
        dev::read_at(&mut self.device, offset, dst).map_err(FatError::from)
    }

    fn write_bytes(&mut self, offset: u64, src: &[u8]) -> FatResult<()> {
        dev::write_at(&mut self.device, offset, src).map_err(FatError::from)
    }

    /// Lists the live entries of the root directory, in on-disk order.
    ///
    /// Deleted entries and long-name records are skipped. The volume label,
    /// if any, is part of the listing.
    pub fn list(&mut self) -> FatResult<Vec<DirEntry>> {
        let root = self.root();
        self.scan(root)
            .filter_map(|slot| match slot {
                Ok(slot) if slot.entry.is_deleted() || slot.entry.is_long_name() => None,
                Ok(slot) => Some(Ok(slot.entry)),
                Err(err) => Some(Err(err)),
            })
            .collect()
    }

    /// Looks up `name` in the root directory.
    pub fn find(&mut self, name: &str) -> FatResult<DirSlot> {
        let name = ShortName::normalize(name)?;
        let root = self.root();
        self.find_by_name(root, &name)
    }

    fn ensure_absent(&mut self, start: Cluster, name: &ShortName) -> FatResult<()> {
        match self.find_by_name(start, name) {
            Ok(_) => Err(FatError::AlreadyExists),
            Err(FatError::NotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Renames `source` to `dest` in place.
    ///
    /// Only the 11 name bytes of the entry are rewritten.
    pub fn rename(&mut self, source: &str, dest: &str) -> FatResult<()> {
        let source_name = ShortName::normalize(source)?;
        let dest_name = ShortName::normalize(dest)?;
        let root = self.root();

        let slot = self.find_by_name(root, &source_name)?;
        self.ensure_absent(root, &dest_name)?;

        self.write_bytes(slot.offset, dest_name.as_bytes())?;
        log::debug!("Renamed {source_name} to {dest_name}");
        Ok(())
    }

    /// Deletes a regular file and releases its cluster chain.
    ///
    /// The entry is tombstoned first, so an interrupted removal only leaks clusters.
    pub fn remove(&mut self, name: &str) -> FatResult<()> {
        let name = ShortName::normalize(name)?;
        let root = self.root();

        let slot = self.find_by_name(root, &name)?;
        ensure_file(&slot.entry)?;

        self.write_bytes(slot.offset, &[DirEntry::DELETED_ENTRY])?;
        let freed = self.free_chain(slot.entry.first_cluster())?;
        log::debug!("Removed {name}, freed {freed} clusters");
        Ok(())
    }

    /// Copies the regular file `source` to a new entry `dest`.
    ///
    /// Returns the number of clusters allocated for the copy.
    pub fn copy(&mut self, source: &str, dest: &str) -> FatResult<u32> {
        let source_name = ShortName::normalize(source)?;
        let dest_name = ShortName::normalize(dest)?;
        let root = self.root();

        let source_slot = self.find_by_name(root, &source_name)?;
        ensure_file(&source_slot.entry)?;
        self.ensure_absent(root, &dest_name)?;
        let dest_offset = self.find_free_slot(root)?;

        let layout = self.layout;
        let cluster_size = layout.cluster_size_bytes();
        let size = u64::from(source_slot.entry.file_size());
        let cluster_count = size.div_ceil(cluster_size);

        let mut buffer =
            vec![0; usize::try_from(cluster_size).map_err(|_| FatError::CorruptVolume)?];
        let mut source_chain = ChainCursor::new(source_slot.entry.first_cluster(), self.chain_limit());
        let mut first = None;
        let mut previous = None;
        let mut remaining = size;
        let mut allocated = 0;

        for _ in 0..cluster_count {
            let Some(source_cluster) = source_chain.advance(self)? else {
                log::warn!("Chain of {source_name} is shorter than its size of {size} bytes");
                return Err(FatError::CorruptVolume);
            };

            let cluster = self.find_free_cluster()?;
            self.mark_end_of_chain(cluster)?;
            match previous {
                Some(previous) => self.link(previous, cluster)?,
                None => first = Some(cluster),
            }
            previous = Some(cluster);
            allocated += 1;

            let len = buffer.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
            self.read_bytes(layout.cluster_byte_offset(source_cluster), &mut buffer[..len])?;
            buffer[len..].fill(0);
            self.write_bytes(layout.cluster_byte_offset(cluster), &buffer)?;
            remaining -= len as u64;
        }

        let mut entry = source_slot.entry;
        entry.set_name(dest_name);
        entry.set_first_cluster(first.unwrap_or(Cluster::FREE));
        self.write_bytes(dest_offset, &entry.to_bytes())?;

        log::debug!("Copied {source_name} to {dest_name} ({size} bytes, {allocated} clusters)");
        Ok(allocated)
    }

    /// Streams the contents of a regular file, one cluster at a time.
    pub fn read_contents(&mut self, name: &str) -> FatResult<FileReader<'_, D>> {
        let name = ShortName::normalize(name)?;
        let root = self.root();

        let slot = self.find_by_name(root, &name)?;
        ensure_file(&slot.entry)?;
        Ok(FileReader::new(self, &slot.entry))
    }

    /// Reads a whole regular file into memory.
    pub fn read_to_vec(&mut self, name: &str) -> FatResult<Vec<u8>> {
        let reader = self.read_contents(name)?;
        let mut contents = Vec::with_capacity(usize::try_from(reader.size()).unwrap_or(0));
        for chunk in reader {
            contents.extend_from_slice(&chunk?);
        }
        Ok(contents)
    }

    /// Counts the free clusters of the volume.
    pub fn free_clusters(&mut self) -> FatResult<u32> {
        self.count_free()
    }
}

fn ensure_file(entry: &DirEntry) -> FatResult<()> {
    if entry.is_file() {
        Ok(())
    } else {
        Err(FatError::NotAFile)
    }
}
