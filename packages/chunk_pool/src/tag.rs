use std::fmt;
use std::panic::Location;
use std::ptr::NonNull;

use foldhash::{HashMap, HashMapExt};

/// Debug metadata attached to an allocation made via
/// [`allocate_tagged()`][crate::MemoryPool::allocate_tagged].
///
/// Tags never affect how memory is allocated or released.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Tag {
    name: String,
    file: String,
    line: u32,
}

impl Tag {
    /// Creates a tag from its parts.
    #[must_use]
    pub fn new(name: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            line,
        }
    }

    /// Creates a tag pointing at the source location of the caller.
    #[must_use]
    #[track_caller]
    pub fn here(name: impl Into<String>) -> Self {
        let location = Location::caller();
        Self::new(name, location.file(), location.line())
    }

    /// Human-readable label of the allocation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source file that made the allocation. Empty if unknown.
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Source line that made the allocation. Zero if unknown.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({}:{})", self.name, self.file, self.line)
        }
    }
}

/// Maps the start address of live tagged allocations to their tags.
#[derive(Debug, Default)]
pub(crate) struct TagStore {
    // We use foldhash for better performance with small hash tables.
    tags: HashMap<NonNull<u8>, Tag>,
}

impl TagStore {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            tags: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, ptr: NonNull<u8>, tag: Tag) {
        self.tags.insert(ptr, tag);
    }

    pub(crate) fn remove(&mut self, ptr: NonNull<u8>) -> Option<Tag> {
        self.tags.remove(&ptr)
    }

    #[must_use]
    pub(crate) fn get(&self, ptr: NonNull<u8>) -> Option<&Tag> {
        self.tags.get(&ptr)
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.tags.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (NonNull<u8>, &Tag)> {
        self.tags.iter().map(|(ptr, tag)| (*ptr, tag))
    }

    pub(crate) fn clear(&mut self) {
        self.tags.clear();
    }
}

// SAFETY: The pointers are only used as map keys and never dereferenced.
unsafe impl Send for TagStore {}

// SAFETY: The pointers are only used as map keys and never dereferenced.
unsafe impl Sync for TagStore {}
