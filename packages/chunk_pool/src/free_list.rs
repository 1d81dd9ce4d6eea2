/// A region inside a chunk that was returned by a caller and can be handed out again.
///
/// Blocks are addressed by chunk index and offset rather than by pointer, so two blocks can only
/// ever be merged if they live in the same chunk.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct FreeBlock {
    pub(crate) chunk: usize,
    pub(crate) offset: usize,
    pub(crate) size: usize,
}

impl FreeBlock {
    #[must_use]
    fn end(&self) -> usize {
        self.offset
            .checked_add(self.size)
            .expect("free block ranges are bounded by the size of their chunk")
    }

    /// Whether `next` starts exactly where this block ends, in the same chunk.
    #[must_use]
    fn is_followed_by(&self, next: &Self) -> bool {
        self.chunk == next.chunk && self.end() == next.offset
    }
}

/// Unordered collection of free blocks with first-fit search, splitting and coalescing.
#[derive(Debug, Default)]
pub(crate) struct FreeList {
    blocks: Vec<FreeBlock>,
}

impl FreeList {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Sum of the sizes of all free blocks.
    #[must_use]
    pub(crate) fn total_size(&self) -> usize {
        self.blocks.iter().map(|block| block.size).sum()
    }

    pub(crate) fn push(&mut self, block: FreeBlock) {
        self.blocks.push(block);
    }

    pub(crate) fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Removes and returns the first block that can hold `footprint` bytes.
    ///
    /// If the block is larger than `footprint` by at least `split_threshold` bytes, only the
    /// front `footprint` bytes are taken and the remainder stays in the list as a new block.
    /// Otherwise the whole block is handed out.
    pub(crate) fn take_first_fit(
        &mut self,
        footprint: usize,
        split_threshold: usize,
    ) -> Option<FreeBlock> {
        let index = self
            .blocks
            .iter()
            .position(|block| block.size >= footprint)?;

        let block = *self
            .blocks
            .get(index)
            .expect("position() only returns valid indexes");

        let remainder = block
            .size
            .checked_sub(footprint)
            .expect("guarded by first-fit predicate above");

        if remainder < split_threshold {
            self.blocks.remove(index);
            return Some(block);
        }

        // The remainder takes the place of the original block, keeping the list order intact.
        let slot = self
            .blocks
            .get_mut(index)
            .expect("position() only returns valid indexes");
        slot.offset = block
            .offset
            .checked_add(footprint)
            .expect("the remainder lies within the original block");
        slot.size = remainder;

        Some(FreeBlock {
            size: footprint,
            ..block
        })
    }

    /// Merges all address-adjacent blocks and returns the number of bytes absorbed into
    /// preceding blocks.
    ///
    /// A single pass over the blocks sorted by address collapses chains of any length.
    pub(crate) fn coalesce(&mut self) -> usize {
        if self.blocks.len() <= 1 {
            return 0;
        }

        self.blocks
            .sort_unstable_by_key(|block| (block.chunk, block.offset));

        let mut merged_bytes: usize = 0;
        let mut merged: Vec<FreeBlock> = Vec::with_capacity(self.blocks.len());

        for block in self.blocks.drain(..) {
            match merged.last_mut() {
                Some(previous) if previous.is_followed_by(&block) => {
                    previous.size = previous
                        .size
                        .checked_add(block.size)
                        .expect("merged blocks are bounded by the size of their chunk");
                    merged_bytes = merged_bytes
                        .checked_add(block.size)
                        .expect("merged bytes are bounded by the total pool size");
                }
                _ => merged.push(block),
            }
        }

        self.blocks = merged;
        merged_bytes
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &FreeBlock> {
        self.blocks.iter()
    }
}
