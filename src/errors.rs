/// Errors returned by region operations.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// A caller-supplied argument was outside the valid range.
    ///
    /// Not retriable; this indicates a bug in the caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The region was used after its last reference was released.
    #[error("region already released")]
    ReleasedResource,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file shrank below the range this region covers.
    ///
    /// Raised when a transfer attempt moves no bytes and the file's
    /// current size can no longer satisfy the requested range.
    #[error("underlying file size {size} smaller than requested count {requested}")]
    TruncatedSource { size: u64, requested: u64 },
}

pub type Result<T> = std::result::Result<T, RegionError>;
