use thiserror::Error;

/// Errors that can occur when allocating from a [`MemoryPool`][crate::MemoryPool].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The request does not fit into a single block of the pool. The pool never spans one
    /// allocation across multiple chunks, so the caller needs another strategy for this size.
    #[error("requested {requested} bytes but the pool serves at most {maximum} bytes per allocation")]
    AllocationTooLarge {
        /// Size of the rejected request, in bytes.
        requested: usize,

        /// The configured block size of the pool, in bytes.
        maximum: usize,
    },

    /// The pool configuration is not usable for the element type.
    #[error("invalid memory pool configuration: {problem}")]
    InvalidConfiguration {
        /// A human-readable description of the problem.
        problem: String,
    },

    /// The system allocator could not satisfy a request that the pool forwarded to it
    /// because the pool itself cannot serve the requested size or alignment.
    #[error("fallback allocation of {size} bytes with alignment {alignment} failed")]
    FallbackAllocationFailure {
        /// Size of the failed request, in bytes.
        size: usize,

        /// Alignment of the failed request, in bytes.
        alignment: usize,
    },
}

/// A specialized `Result` type for memory pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
