use super::{
    FatError, FatFs, FatResult,
    dirent::DirEntry,
    fat::{ChainCursor, FatEntries},
};
use crate::BlockDevice;

/// Streaming reader over the contents of a regular file.
///
/// Each item is the data held by one cluster of the file, the last one being
/// cut at the file size.
pub struct FileReader<'a, D: BlockDevice> {
    fs: &'a mut FatFs<D>,
    chain: ChainCursor,
    size: u64,
    remaining: u64,
    failed: bool,
}

impl<'a, D: BlockDevice> FileReader<'a, D> {
    pub(super) fn new(fs: &'a mut FatFs<D>, entry: &DirEntry) -> Self {
        let chain = ChainCursor::new(entry.first_cluster(), fs.chain_limit());
        let size = u64::from(entry.file_size());
        Self {
            fs,
            chain,
            size,
            remaining: size,
            failed: false,
        }
    }

    #[must_use]
    #[inline]
    /// Returns the size of the file in bytes.
    pub const fn size(&self) -> u64 {
        self.size
    }

    fn read_chunk(&mut self) -> FatResult<Vec<u8>> {
        let Some(cluster) = self.chain.advance(self.fs)? else {
            log::warn!(
                "Cluster chain ended with {} of {} bytes left to read",
                self.remaining,
                self.size
            );
            return Err(FatError::CorruptVolume);
        };

        log::trace!("Reading file cluster {}", cluster.value());
        let layout = self.fs.layout;
        let len = self.remaining.min(layout.cluster_size_bytes());
        let mut chunk = vec![0; usize::try_from(len).map_err(|_| FatError::CorruptVolume)?];
        self.fs
            .read_bytes(layout.cluster_byte_offset(cluster), &mut chunk)?;
        self.remaining -= len;
        Ok(chunk)
    }
}

impl<D: BlockDevice> Iterator for FileReader<'_, D> {
    type Item = FatResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        let chunk = self.read_chunk();
        self.failed = chunk.is_err();
        Some(chunk)
    }
}
