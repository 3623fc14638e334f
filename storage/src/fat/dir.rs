//! Directory scanning over a cluster chain.
use super::{
    Cluster, FatError, FatFs, FatResult,
    dirent::{DIR_ENTRY_SIZE, DirEntry},
    fat::{ChainCursor, FatEntries},
    name::ShortName,
};
use crate::BlockDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Location of a 32-byte slot in a directory.
pub struct SlotPosition {
    /// Index of the slot from the start of the directory
    pub index: usize,
    /// Byte offset of the slot on the volume
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A directory slot along with its decoded entry.
pub struct DirSlot {
    /// Index of the slot from the start of the directory
    pub index: usize,
    /// Byte offset of the slot on the volume
    pub offset: u64,
    pub entry: DirEntry,
}

/// Lazy iterator over the slots of a directory.
///
/// Deleted entries and long-name records are yielded as well, callers filter
/// them out. Iteration stops at the first end-of-directory slot, whose position
/// is then available through [`DirScan::end_slot`], or at the end of the chain.
/// Clusters are read one at a time, only when the previous one is exhausted.
pub struct DirScan<'a, D: BlockDevice> {
    fs: &'a mut FatFs<D>,
    chain: ChainCursor,
    buffer: Vec<u8>,
    cluster_offset: u64,
    slot_in_cluster: usize,
    index: usize,
    end_slot: Option<SlotPosition>,
    finished: bool,
}

impl<'a, D: BlockDevice> DirScan<'a, D> {
    fn new(fs: &'a mut FatFs<D>, start: Cluster) -> Self {
        let chain = ChainCursor::new(start, fs.chain_limit());
        let cluster_size = usize::try_from(fs.layout.cluster_size_bytes()).unwrap_or(0);
        Self {
            fs,
            chain,
            buffer: vec![0; cluster_size],
            cluster_offset: 0,
            slot_in_cluster: cluster_size / DIR_ENTRY_SIZE,
            index: 0,
            end_slot: None,
            finished: false,
        }
    }

    #[must_use]
    #[inline]
    /// Position of the end-of-directory slot, once the scan has reached it.
    pub const fn end_slot(&self) -> Option<SlotPosition> {
        self.end_slot
    }

    fn slots_per_cluster(&self) -> usize {
        self.buffer.len() / DIR_ENTRY_SIZE
    }

    /// Loads the next cluster of the directory into the buffer.
    ///
    /// Returns `false` at the end of the chain.
    fn load_next_cluster(&mut self) -> FatResult<bool> {
        let Some(cluster) = self.chain.advance(self.fs)? else {
            return Ok(false);
        };
        log::trace!("Reading directory cluster {}", cluster.value());
        self.cluster_offset = self.fs.layout.cluster_byte_offset(cluster);
        self.fs.read_bytes(self.cluster_offset, &mut self.buffer)?;
        self.slot_in_cluster = 0;
        Ok(true)
    }
}

impl<D: BlockDevice> Iterator for DirScan<'_, D> {
    type Item = FatResult<DirSlot>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if self.slot_in_cluster >= self.slots_per_cluster() {
            match self.load_next_cluster() {
                Ok(true) => {}
                Ok(false) => {
                    self.finished = true;
                    return None;
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }

        let start = self.slot_in_cluster * DIR_ENTRY_SIZE;
        let mut raw = [0; DIR_ENTRY_SIZE];
        raw.copy_from_slice(&self.buffer[start..start + DIR_ENTRY_SIZE]);
        let entry = DirEntry::from_bytes(&raw);

        let position = SlotPosition {
            index: self.index,
            offset: self.cluster_offset + start as u64,
        };

        if entry.is_end_of_directory() {
            self.end_slot = Some(position);
            self.finished = true;
            return None;
        }

        self.slot_in_cluster += 1;
        self.index += 1;
        Some(Ok(DirSlot {
            index: position.index,
            offset: position.offset,
            entry,
        }))
    }
}

impl<D: BlockDevice> FatFs<D> {
    /// Scans the directory whose chain starts at `start`.
    pub fn scan(&mut self, start: Cluster) -> DirScan<'_, D> {
        DirScan::new(self, start)
    }

    /// Finds the live short entry named `name` in the directory starting at `start`.
    pub fn find_by_name(&mut self, start: Cluster, name: &ShortName) -> FatResult<DirSlot> {
        for slot in self.scan(start) {
            let slot = slot?;
            if slot.entry.is_valid() && !slot.entry.is_long_name() && slot.entry.name() == *name {
                return Ok(slot);
            }
        }
        Err(FatError::NotFound)
    }

    /// Returns the byte offset of a slot that can receive a new entry.
    ///
    /// The first deleted slot wins, otherwise the end-of-directory slot is
    /// reused. The directory is never extended with a new cluster.
    pub fn find_free_slot(&mut self, start: Cluster) -> FatResult<u64> {
        let mut scan = self.scan(start);
        for slot in &mut scan {
            let slot = slot?;
            if slot.entry.is_deleted() {
                return Ok(slot.offset);
            }
        }
        scan.end_slot()
            .map(|slot| slot.offset)
            .ok_or(FatError::DirectoryFull)
    }
}
