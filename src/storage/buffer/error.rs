use thiserror::Error;
use crate::common::types::PageId;
use crate::storage::disk::DiskManagerError;

#[derive(Error, Debug)]
pub enum BufferPoolError {
    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("No free or evictable frames available")]
    NoFreeFrames,

    #[error("Disk manager error: {0}")]
    DiskManagerError(#[from] DiskManagerError),
}
