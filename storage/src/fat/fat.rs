use super::{Cluster, FatError, FatFs, FatResult};
use crate::BlockDevice;
use core::ops::ControlFlow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// FAT32 table entry
pub enum FatEntry {
    /// Free cluster
    Free,
    /// Used cluster, pointing to the next cluster in the chain
    Next(Cluster),
    /// Last cluster in the chain
    EndOfChain,
    /// Bad cluster
    Bad,
    /// Reserved cluster
    Reserved,
}

impl FatEntry {
    #[must_use]
    /// Decodes a raw table value, ignoring its upper 4 bits.
    pub const fn from_raw(raw: u32) -> Self {
        match raw & Cluster::MASK {
            0 => Self::Free,
            0x0FFF_FFF7 => Self::Bad,
            0x0FFF_FFF0..=0x0FFF_FFF6 => Self::Reserved,
            0x0FFF_FFF8..=0x0FFF_FFFF => Self::EndOfChain,
            val => Self::Next(Cluster::new(val)),
        }
    }

    #[must_use]
    /// Encodes the entry into the lower 28 bits of a table value.
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::Free => 0,
            Self::Next(next) => next.value() & Cluster::MASK,
            Self::EndOfChain => 0x0FFF_FFFF,
            Self::Bad => 0x0FFF_FFF7,
            Self::Reserved => 0x0FFF_FFF6,
        }
    }
}

/// Collection of FAT entries
pub trait FatEntries {
    #[must_use]
    /// Returns the exclusive upper bound of the cluster numbers this table can address.
    fn cluster_bound(&self) -> u32;

    /// Returns the entry value for the given cluster
    fn get(&mut self, cluster: Cluster) -> FatResult<FatEntry>;

    /// Sets the entry value for the given cluster
    fn set(&mut self, cluster: Cluster, entry: FatEntry) -> FatResult<()>;

    /// Returns the lowest-numbered free cluster, without claiming it.
    fn find_free_cluster(&mut self) -> FatResult<Cluster>;

    /// Counts the number of free clusters
    fn count_free(&mut self) -> FatResult<u32>;

    #[must_use]
    /// Maximum number of clusters any well-formed chain can span.
    fn chain_limit(&self) -> u32 {
        self.cluster_bound().saturating_sub(Cluster::FIRST.value())
    }

    /// Fails unless `cluster` is a data cluster this table can address.
    fn check_cluster(&self, cluster: Cluster) -> FatResult<()> {
        if cluster.value() >= Cluster::FIRST.value() && cluster.value() < self.cluster_bound() {
            Ok(())
        } else {
            log::warn!(
                "Cluster {} is outside of the data region (bound {})",
                cluster.value(),
                self.cluster_bound()
            );
            Err(FatError::CorruptVolume)
        }
    }

    /// Returns the cluster following `cluster` in its chain, or `None` at the end of the chain.
    ///
    /// Free, bad or reserved links inside a chain mean the table is corrupted.
    fn next_cluster(&mut self, cluster: Cluster) -> FatResult<Option<Cluster>> {
        match self.get(cluster)? {
            FatEntry::Next(next) => {
                self.check_cluster(next)?;
                Ok(Some(next))
            }
            FatEntry::EndOfChain => Ok(None),
            entry => {
                log::warn!("Cluster {} links to {entry:?}", cluster.value());
                Err(FatError::CorruptVolume)
            }
        }
    }


    /// Makes `from` point to `to`.
    fn link(&mut self, from: Cluster, to: Cluster) -> FatResult<()> {
        self.set(from, FatEntry::Next(to))
    }

    fn mark_end_of_chain(&mut self, cluster: Cluster) -> FatResult<()> {
        self.set(cluster, FatEntry::EndOfChain)
    }

    /// Frees every cluster of the chain starting at `start`, returning how many were freed.
    ///
    /// Empty chains (`start` free or end-of-chain) are a no-op.
    fn free_chain(&mut self, start: Cluster) -> FatResult<u32> {
        let mut cursor = ChainCursor::new(start, self.chain_limit());
        let mut previous = None;
        let mut freed = 0;

        // A cluster is only freed once its successor has been read.
        while let Some(cluster) = cursor.advance(self)? {
            if let Some(previous) = previous.replace(cluster) {
                self.set(previous, FatEntry::Free)?;
                freed += 1;
            }
        }
        if let Some(last) = previous {
            self.set(last, FatEntry::Free)?;
            freed += 1;
        }

        Ok(freed)
    }

    #[must_use]
    /// Returns an iterator over all clusters in a chain starting from the given cluster
    fn chain(&mut self, start: Cluster) -> FatChainIter<'_, Self>
    where
        Self: Sized,
    {
        let cursor = ChainCursor::new(start, self.chain_limit());
        FatChainIter { fat: self, cursor }
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Start(Cluster),
    At(Cluster),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Position inside a cluster chain.
///
/// The cursor doesn't borrow the table, so callers can interleave other table
/// accesses between steps. The link out of a cluster is only read when moving
/// past it, and a chain longer than `limit` clusters is reported as corrupted.
pub struct ChainCursor {
    state: CursorState,
    remaining: u32,
}

impl ChainCursor {
    #[must_use]
    pub const fn new(start: Cluster, limit: u32) -> Self {
        let state = if start.is_free() || start.is_end_of_chain() {
            CursorState::Done
        } else {
            CursorState::Start(start)
        };
        Self {
            state,
            remaining: limit,
        }
    }

    /// Moves to the next cluster of the chain.
    ///
    /// Once an error has been returned, the cursor stays exhausted.
    pub fn advance<F: FatEntries + ?Sized>(&mut self, fat: &mut F) -> FatResult<Option<Cluster>> {
        let next = match self.state {
            CursorState::Start(start) => start,
            CursorState::At(current) => match fat.next_cluster(current) {
                Ok(Some(next)) => next,
                Ok(None) => {
                    self.state = CursorState::Done;
                    return Ok(None);
                }
                Err(err) => {
                    self.state = CursorState::Done;
                    return Err(err);
                }
            },
            CursorState::Done => return Ok(None),
        };

        self.state = CursorState::Done;
        if self.remaining == 0 {
            log::warn!("Cluster chain loops back on itself");
            return Err(FatError::CorruptVolume);
        }
        fat.check_cluster(next)?;

        self.remaining -= 1;
        self.state = CursorState::At(next);
        Ok(Some(next))
    }
}

/// Iterator over a chain of clusters
pub struct FatChainIter<'a, T: FatEntries> {
    fat: &'a mut T,
    cursor: ChainCursor,
}

impl<T: FatEntries> Iterator for FatChainIter<'_, T> {
    type Item = FatResult<Cluster>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.advance(self.fat).transpose()
    }
}

impl<D: BlockDevice> FatFs<D> {
    /// Visits the entries of the first FAT in cluster order, one sector at a time,
    /// until `visit` breaks.
    fn scan_fat<B>(
        &mut self,
        mut visit: impl FnMut(Cluster, FatEntry) -> ControlFlow<B>,
    ) -> FatResult<Option<B>> {
        let layout = self.layout;
        let bound = layout.cluster_bound();
        let mut sector = vec![
            0;
            usize::try_from(layout.bytes_per_sector())
                .map_err(|_| FatError::CorruptVolume)?
        ];

        let mut value = 0;
        while value < bound {
            self.read_bytes(layout.fat_entry_offset(Cluster::new(value)), &mut sector)?;
            for raw in sector.chunks_exact(4) {
                if value >= bound {
                    break;
                }
                if value >= Cluster::FIRST.value() {
                    let raw = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                    if let ControlFlow::Break(b) = visit(Cluster::new(value), FatEntry::from_raw(raw)) {
                        return Ok(Some(b));
                    }
                }
                value += 1;
            }
        }

        Ok(None)
    }
}

/// On-disk table. Only the first FAT copy is read and written.
impl<D: BlockDevice> FatEntries for FatFs<D> {
    #[inline]
    fn cluster_bound(&self) -> u32 {
        self.layout.cluster_bound()
    }

    fn get(&mut self, cluster: Cluster) -> FatResult<FatEntry> {
        self.check_cluster(cluster)?;
        let mut raw = [0; 4];
        self.read_bytes(self.layout.fat_entry_offset(cluster), &mut raw)?;
        Ok(FatEntry::from_raw(u32::from_le_bytes(raw)))
    }

    fn set(&mut self, cluster: Cluster, entry: FatEntry) -> FatResult<()> {
        self.check_cluster(cluster)?;
        let offset = self.layout.fat_entry_offset(cluster);

        // The upper 4 bits are reserved and must be preserved.
        let mut raw = [0; 4];
        self.read_bytes(offset, &mut raw)?;
        let value = (u32::from_le_bytes(raw) & !Cluster::MASK) | entry.to_raw();
        self.write_bytes(offset, &value.to_le_bytes())
    }

    fn find_free_cluster(&mut self) -> FatResult<Cluster> {
        self.scan_fat(|cluster, entry| {
            if entry == FatEntry::Free {
                ControlFlow::Break(cluster)
            } else {
                ControlFlow::Continue(())
            }
        })?
        .ok_or_else(|| {
            log::debug!("No free cluster left");
            FatError::VolumeFull
        })
    }

    fn count_free(&mut self) -> FatResult<u32> {
        let mut count = 0;
        self.scan_fat::<()>(|_, entry| {
            if entry == FatEntry::Free {
                count += 1;
            }
            ControlFlow::Continue(())
        })?;
        Ok(count)
    }
}
