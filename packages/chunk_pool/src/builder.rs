use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use crate::{BoxedGrowthStrategy, ChunkGrowthStrategy, Error, MemoryPool, Result};

/// Block size used when none is specified.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Alignment used when none is specified, unless the element type requires more.
pub const DEFAULT_ALIGNMENT: usize = 16;

/// Builder for creating an instance of [`MemoryPool`].
///
/// You only need to use this builder if you want to customize the pool configuration.
/// The default configuration used by [`MemoryPool::new()`] uses a block size of
/// [`DEFAULT_BLOCK_SIZE`] bytes, an alignment of [`DEFAULT_ALIGNMENT`] bytes (or the alignment
/// of `T`, if larger) and doubles the chunk size every time the pool grows.
///
/// # Examples
///
/// ```
/// use chunk_pool::{LinearGrowth, MemoryPool};
///
/// let pool = MemoryPool::<u32>::builder()
///     .block_size(8192)
///     .alignment(64)
///     .growth_strategy(LinearGrowth::new(8192))
///     .build();
///
/// assert_eq!(pool.block_size(), 8192);
/// assert_eq!(pool.alignment(), 64);
/// ```
#[must_use]
pub struct MemoryPoolBuilder<T> {
    block_size: usize,
    alignment: Option<usize>,
    growth_strategy: BoxedGrowthStrategy,

    _item: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for MemoryPoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("block_size", &self.block_size)
            .field("alignment", &self.alignment)
            .field("growth_strategy", &self.growth_strategy)
            .finish()
    }
}

impl<T> MemoryPoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            alignment: None,
            growth_strategy: BoxedGrowthStrategy::default(),
            _item: PhantomData,
        }
    }

    /// Sets the block size: the size of the first chunk and the largest number of bytes a single
    /// allocation may request.
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the alignment of every address handed out by the pool. Must be a power of two,
    /// at least the alignment of `T` and must evenly divide the block size.
    pub fn alignment(mut self, alignment: usize) -> Self {
        self.alignment = Some(alignment);
        self
    }

    /// Sets the strategy that decides how large new chunks are when the pool needs to grow.
    pub fn growth_strategy(mut self, strategy: impl ChunkGrowthStrategy + 'static) -> Self {
        self.growth_strategy = BoxedGrowthStrategy(Box::new(strategy));
        self
    }

    /// Builds the memory pool, returning an error if the configuration is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// use chunk_pool::{Error, MemoryPool};
    ///
    /// let result = MemoryPool::<u64>::builder().alignment(3).try_build();
    /// assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
    /// ```
    pub fn try_build(self) -> Result<MemoryPool<T>> {
        let alignment = self
            .alignment
            .unwrap_or_else(|| DEFAULT_ALIGNMENT.max(align_of::<T>()));

        validate::<T>(self.block_size, alignment)?;

        Ok(MemoryPool::new_inner(
            self.block_size,
            alignment,
            self.growth_strategy,
        ))
    }

    /// Builds the memory pool with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid for `T`. See [`try_build()`][Self::try_build]
    /// for the list of rules.
    #[must_use]
    pub fn build(self) -> MemoryPool<T> {
        match self.try_build() {
            Ok(pool) => pool,
            Err(error) => panic!("{error}"),
        }
    }
}

fn validate<T>(block_size: usize, alignment: usize) -> Result<()> {
    let problem = if size_of::<T>() == 0 {
        format!("element type {} is zero-sized", type_name::<T>())
    } else if !alignment.is_power_of_two() {
        format!("alignment {alignment} is not a power of two")
    } else if alignment < align_of::<T>() {
        format!(
            "alignment {alignment} is smaller than the alignment {} of {}",
            align_of::<T>(),
            type_name::<T>()
        )
    } else if block_size < size_of::<T>() {
        format!(
            "block size {block_size} is smaller than one element of {} ({} bytes)",
            type_name::<T>(),
            size_of::<T>()
        )
    } else if block_size.checked_rem(alignment) != Some(0) {
        format!("block size {block_size} is not a multiple of alignment {alignment}")
    } else {
        return Ok(());
    };

    Err(Error::InvalidConfiguration { problem })
}
