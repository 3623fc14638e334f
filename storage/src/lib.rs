#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

use thiserror::Error;

pub mod dev;
pub mod fat;

#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
/// An error that can occur when performing block device operations.
pub enum BlockDeviceError {
    #[error("I/O error: {0}")]
    Io(std::io::ErrorKind),
    #[error("Out of bounds")]
    OutOfBounds,
    #[error("Unsupported operation")]
    Unsupported,
    #[error("Unaligned access")]
    UnalignedAccess,
}

impl From<std::io::Error> for BlockDeviceError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::WriteZero => {
                Self::OutOfBounds
            }
            std::io::ErrorKind::Unsupported => Self::Unsupported,
            kind => Self::Io(kind),
        }
    }
}

/// A trait for block devices.
///
/// These are backing stores (disk images, memory buffers) that can perform
/// read and/or write operations in blocks.
pub trait BlockDevice {
    const BLOCK_SIZE: usize;

    /// Read blocks from the device into the given buffer.
    ///
    /// The `offset` parameter specifies the block offset from the start of the device.
    ///
    /// ## Errors
    ///
    /// This function returns an error if the read operation failed, if fewer bytes
    /// than requested are available, or if `dst.len()` isn't a multiple of `Self::BLOCK_SIZE`.
    fn read(&mut self, dst: &mut [u8], offset: usize) -> Result<(), BlockDeviceError>;
    /// Write blocks to the device from the given buffer.
    ///
    /// ## Errors
    ///
    /// This function returns an error if the write operation failed, if the device
    /// is too small, or if `src.len()` isn't a multiple of `Self::BLOCK_SIZE`.
    fn write(&mut self, src: &[u8], offset: usize) -> Result<(), BlockDeviceError>;
}

impl<T: BlockDevice> BlockDevice for &mut T {
    const BLOCK_SIZE: usize = T::BLOCK_SIZE;

    #[inline]
    fn read(&mut self, dst: &mut [u8], offset: usize) -> Result<(), BlockDeviceError> {
        (**self).read(dst, offset)
    }

    #[inline]
    fn write(&mut self, src: &[u8], offset: usize) -> Result<(), BlockDeviceError> {
        (**self).write(src, offset)
    }
}
