use std::fmt;

/// Decides how large the next chunk of a [`MemoryPool`][crate::MemoryPool] should be.
///
/// The pool calls [`calculate()`][Self::calculate] with the size of its most recently created
/// chunk (or the configured block size if it has none) whenever no existing chunk can satisfy a
/// request. The pool never creates a chunk smaller than the request that triggered the growth,
/// whatever the strategy returns.
///
/// Any `Fn(usize) -> usize` closure that is thread-safe can be used as a strategy.
///
/// # Examples
///
/// ```
/// use chunk_pool::MemoryPool;
///
/// // Grow by a fixed 1 KiB on top of the previous chunk.
/// let pool = MemoryPool::<u64>::builder()
///     .growth_strategy(|previous: usize| previous + 1024)
///     .build();
/// # drop(pool);
/// ```
pub trait ChunkGrowthStrategy: Send + Sync {
    /// Returns the recommended size in bytes of the next chunk, given a reference size.
    #[must_use]
    fn calculate(&self, requested_size: usize) -> usize;
}

impl<F> ChunkGrowthStrategy for F
where
    F: Fn(usize) -> usize + Send + Sync,
{
    fn calculate(&self, requested_size: usize) -> usize {
        self(requested_size)
    }
}

/// Multiplies the reference size by a constant factor. This is the default strategy, with a
/// factor of 2.0.
///
/// # Examples
///
/// ```
/// use chunk_pool::{ChunkGrowthStrategy, ExponentialGrowth};
///
/// let strategy = ExponentialGrowth::new(1.5);
/// assert_eq!(strategy.calculate(4096), 6144);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExponentialGrowth {
    factor: f64,
}

impl ExponentialGrowth {
    /// Default growth factor used when no factor is specified.
    pub const DEFAULT_FACTOR: f64 = 2.0;

    /// Creates a strategy that multiplies the reference size by `factor`.
    ///
    /// # Panics
    ///
    /// Panics if `factor` is not finite or is less than 1.0, as such a strategy could produce
    /// chunks smaller than the reference size.
    #[must_use]
    pub fn new(factor: f64) -> Self {
        assert!(
            factor.is_finite() && factor >= 1.0,
            "exponential growth factor must be finite and at least 1.0, got {factor}"
        );

        Self { factor }
    }

    /// The factor applied to the reference size.
    #[must_use]
    pub fn factor(&self) -> f64 {
        self.factor
    }
}

impl Default for ExponentialGrowth {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FACTOR)
    }
}

impl ChunkGrowthStrategy for ExponentialGrowth {
    #[expect(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "chunk sizes are far below the range where f64 loses integer precision; the float-to-int cast saturates"
    )]
    fn calculate(&self, requested_size: usize) -> usize {
        let scaled = (requested_size as f64 * self.factor) as usize;

        // Guards against rounding below the input for factors close to 1.0.
        scaled.max(requested_size)
    }
}

/// Adds a constant number of bytes to the reference size.
///
/// # Examples
///
/// ```
/// use chunk_pool::{ChunkGrowthStrategy, LinearGrowth};
///
/// let strategy = LinearGrowth::new(512);
/// assert_eq!(strategy.calculate(4096), 4608);
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinearGrowth {
    increment: usize,
}

impl LinearGrowth {
    /// Creates a strategy that adds `increment` bytes to the reference size.
    #[must_use]
    pub fn new(increment: usize) -> Self {
        Self { increment }
    }

    /// The number of bytes added to the reference size.
    #[must_use]
    pub fn increment(&self) -> usize {
        self.increment
    }
}

impl ChunkGrowthStrategy for LinearGrowth {
    fn calculate(&self, requested_size: usize) -> usize {
        requested_size.saturating_add(self.increment)
    }
}

/// Type-erased strategy as stored by the pool.
pub(crate) struct BoxedGrowthStrategy(pub(crate) Box<dyn ChunkGrowthStrategy>);

impl fmt::Debug for BoxedGrowthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedGrowthStrategy").finish_non_exhaustive()
    }
}

impl Default for BoxedGrowthStrategy {
    fn default() -> Self {
        Self(Box::new(ExponentialGrowth::default()))
    }
}
