use thiserror::Error;
use crate::storage::buffer::BufferPoolError;

#[derive(Error, Debug)]
pub enum BTreeError {
    #[error("Invalid page format")]
    InvalidPageFormat,

    #[error("Node does not fit in a page")]
    NodeTooLarge,

    #[error("Buffer pool error: {0}")]
    BufferPoolError(#[from] BufferPoolError),
}
