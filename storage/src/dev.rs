//! Backing stores and the byte-granular I/O primitive built on top of them.
//!
//! Every transfer is whole and exact: a short read or write is reported as an
//! error and never retried or silently truncated.

use crate::{BlockDevice, BlockDeviceError};
use std::{
    fs::{File, OpenOptions},
    io::{Read as _, Seek as _, SeekFrom, Write as _},
    path::Path,
};

/// Reads exactly `dst.len()` bytes starting at the byte `offset` of the device.
///
/// Unaligned edges are handled by reading the surrounding blocks.
pub fn read_at<D: BlockDevice>(
    device: &mut D,
    offset: u64,
    dst: &mut [u8],
) -> Result<(), BlockDeviceError> {
    if dst.is_empty() {
        return Ok(());
    }
    let offset = usize::try_from(offset).map_err(|_| BlockDeviceError::OutOfBounds)?;

    let offset_in_blocks = offset / D::BLOCK_SIZE;
    let offset_in_bytes = offset % D::BLOCK_SIZE;
    let block_count = (dst.len() + offset_in_bytes).div_ceil(D::BLOCK_SIZE);

    if offset_in_bytes == 0 && dst.len() == block_count * D::BLOCK_SIZE {
        device.read(dst, offset_in_blocks)
    } else {
        let mut around_buffer = vec![0; block_count * D::BLOCK_SIZE];
        device.read(&mut around_buffer, offset_in_blocks)?;
        dst.copy_from_slice(&around_buffer[offset_in_bytes..offset_in_bytes + dst.len()]);
        Ok(())
    }
}

/// Writes all of `src` starting at the byte `offset` of the device.
///
/// Bytes sharing a block with `src` but outside of it are preserved.
pub fn write_at<D: BlockDevice>(
    device: &mut D,
    offset: u64,
    src: &[u8],
) -> Result<(), BlockDeviceError> {
    if src.is_empty() {
        return Ok(());
    }
    let offset = usize::try_from(offset).map_err(|_| BlockDeviceError::OutOfBounds)?;

    let offset_in_blocks = offset / D::BLOCK_SIZE;
    let offset_in_bytes = offset % D::BLOCK_SIZE;
    let block_count = (src.len() + offset_in_bytes).div_ceil(D::BLOCK_SIZE);

    if offset_in_bytes == 0 && src.len() == block_count * D::BLOCK_SIZE {
        device.write(src, offset_in_blocks)
    } else {
        let mut around_buffer = vec![0; block_count * D::BLOCK_SIZE];
        // This avoids overwriting the data around the offset.
        device.read(&mut around_buffer, offset_in_blocks)?;
        around_buffer[offset_in_bytes..offset_in_bytes + src.len()].copy_from_slice(src);
        device.write(&around_buffer, offset_in_blocks)
    }
}

/// Converts a block range into a byte range, checking it against the device length.
fn byte_range(
    offset: usize,
    len: usize,
    block_size: usize,
    device_len: u64,
) -> Result<u64, BlockDeviceError> {
    if len % block_size != 0 {
        return Err(BlockDeviceError::UnalignedAccess);
    }
    let start = offset
        .checked_mul(block_size)
        .ok_or(BlockDeviceError::OutOfBounds)? as u64;
    let end = start
        .checked_add(len as u64)
        .ok_or(BlockDeviceError::OutOfBounds)?;
    if end > device_len {
        return Err(BlockDeviceError::OutOfBounds);
    }
    Ok(start)
}

#[derive(Debug)]
/// A disk image stored in a regular file.
///
/// The image never grows: accesses past its current length are rejected.
pub struct ImageFile {
    file: File,
    len: u64,
}

impl ImageFile {
    /// Opens an existing image for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BlockDeviceError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_file(file)
    }

    /// Opens an existing image for reading only.
    ///
    /// Writes will fail with the error reported by the operating system.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, BlockDeviceError> {
        let file = OpenOptions::new().read(true).open(path)?;
        Self::from_file(file)
    }

    /// Wraps an already opened file.
    pub fn from_file(file: File) -> Result<Self, BlockDeviceError> {
        let len = file.metadata()?.len();
        log::debug!("Opened disk image of {len} bytes");
        Ok(Self { file, len })
    }

    #[must_use]
    #[inline]
    /// Returns the length of the image in bytes.
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Flushes pending writes to the underlying storage.
    pub fn sync(&mut self) -> Result<(), BlockDeviceError> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}

impl BlockDevice for ImageFile {
    const BLOCK_SIZE: usize = 512;

    fn read(&mut self, dst: &mut [u8], offset: usize) -> Result<(), BlockDeviceError> {
        let start = byte_range(offset, dst.len(), Self::BLOCK_SIZE, self.len)?;
        self.file.seek(SeekFrom::Start(start))?;
        self.file.read_exact(dst)?;
        Ok(())
    }

    fn write(&mut self, src: &[u8], offset: usize) -> Result<(), BlockDeviceError> {
        let start = byte_range(offset, src.len(), Self::BLOCK_SIZE, self.len)?;
        self.file.seek(SeekFrom::Start(start))?;
        self.file.write_all(src)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// A disk image held entirely in memory.
pub struct RamDisk {
    data: Vec<u8>,
}

impl RamDisk {
    #[must_use]
    #[inline]
    /// Creates a zero-filled disk of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    #[must_use]
    #[inline]
    pub const fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[must_use]
    #[inline]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl BlockDevice for RamDisk {
    const BLOCK_SIZE: usize = 512;

    fn read(&mut self, dst: &mut [u8], offset: usize) -> Result<(), BlockDeviceError> {
        let start = byte_range(offset, dst.len(), Self::BLOCK_SIZE, self.data.len() as u64)?;
        let start = usize::try_from(start).map_err(|_| BlockDeviceError::OutOfBounds)?;
        dst.copy_from_slice(&self.data[start..start + dst.len()]);
        Ok(())
    }

    fn write(&mut self, src: &[u8], offset: usize) -> Result<(), BlockDeviceError> {
        let start = byte_range(offset, src.len(), Self::BLOCK_SIZE, self.data.len() as u64)?;
        let start = usize::try_from(start).map_err(|_| BlockDeviceError::OutOfBounds)?;
        self.data[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }
}
