//! Process-lifetime bump arena for runtime type metadata.
//!
//! Type descriptors, protocol descriptors, witness tables and rendered type
//! names are created once and referenced by identity for the rest of the
//! process. [`MetadataArena`] hands out stable references for exactly that
//! use:
//!
//! - **Stable addresses**: chunks never move or shrink
//! - **Lock-free fast path**: an atomic CAS bump pointer per chunk
//! - **No reclamation**: values written into the arena are never dropped
//!
//! # Example
//!
//! ```
//! use oxicast_mem::arena::MetadataArena;
//!
//! let arena = MetadataArena::new(16 * 1024);
//!
//! let answer = arena.alloc(42u64);
//! let name = arena.alloc_str("Circle");
//!
//! assert_eq!(*answer, 42);
//! assert_eq!(name, "Circle");
//! assert_eq!(arena.stats().chunk_count, 1);
//! ```

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

/// Error returned when the system allocator cannot provide a new chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaAllocError {
    /// Size of the chunk that could not be allocated.
    pub requested: usize,
}

impl std::fmt::Display for ArenaAllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "metadata arena could not allocate a {} byte chunk",
            self.requested
        )
    }
}

impl std::error::Error for ArenaAllocError {}

/// Alignment of every chunk base address.
const CHUNK_ALIGNMENT: usize = 16;

/// Smallest chunk the arena will request (4 KiB).
const MIN_CHUNK_SIZE: usize = 4096;

/// Chunk size used by [`global_arena`] (64 KiB).
pub const GLOBAL_CHUNK_SIZE: usize = 64 * 1024;

/// Snapshot of arena usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaStats {
    /// Bytes handed out to callers, excluding alignment padding.
    pub total_allocated: usize,
    /// Number of chunks in the chain.
    pub chunk_count: usize,
    /// Combined capacity of all chunks in bytes.
    pub total_capacity: usize,
}

/// One contiguous block of memory with an atomic bump pointer.
///
/// Chunks form a singly linked list through `previous`, newest first. They
/// are leaked on creation and stay valid for the life of the process.
struct Chunk {
    base: NonNull<u8>,
    bump: AtomicPtr<u8>,
    limit: usize,
    capacity: usize,
    previous: *const Chunk,
}

impl Chunk {
    fn create(
        capacity: usize,
        previous: *const Chunk,
    ) -> Result<&'static Chunk, ArenaAllocError> {
        let layout = Layout::from_size_align(capacity, CHUNK_ALIGNMENT)
            .map_err(|_| ArenaAllocError { requested: capacity })?;

        // SAFETY: layout has a non-zero size (capacity >= MIN_CHUNK_SIZE).
        let raw = unsafe { alloc::alloc(layout) };
        let base =
            NonNull::new(raw).ok_or(ArenaAllocError { requested: capacity })?;

        let chunk = Box::new(Chunk {
            base,
            bump: AtomicPtr::new(base.as_ptr()),
            limit: base.as_ptr().addr() + capacity,
            capacity,
            previous,
        });

        Ok(Box::leak(chunk))
    }

    /// Reserves `size` bytes aligned to `align`, or `None` when the chunk is
    /// exhausted. Safe to call from many threads at once.
    fn bump(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let mut current = self.bump.load(Ordering::Acquire);

        loop {
            let start = current.addr().checked_add(align - 1)? & !(align - 1);
            let end = start.checked_add(size)?;

            if end > self.limit {
                return None;
            }

            match self.bump.compare_exchange_weak(
                current,
                current.with_addr(end),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                // SAFETY: start lies inside this chunk and is non-null.
                Ok(_) => {
                    return Some(unsafe {
                        NonNull::new_unchecked(current.with_addr(start))
                    });
                }
                Err(observed) => current = observed,
            }
        }
    }

    fn base_addr(&self) -> usize {
        self.base.as_ptr().addr()
    }
}

/// Thread-safe arena whose allocations live as long as the arena itself.
///
/// The arena never runs destructors. Values with heap-owning fields (for
/// example a `Vec` of parameter types) are intentionally leaked together with
/// the arena, which matches the lifetime of runtime metadata.
///
/// # Thread Safety
///
/// Allocation from the current chunk is a CAS loop on the chunk's bump
/// pointer. Installing a new chunk takes a mutex so that two threads that
/// both run out of space only grow the chain once.
pub struct MetadataArena {
    head: AtomicPtr<Chunk>,
    grow_lock: Mutex<()>,
    chunk_size: usize,
    allocated: AtomicUsize,
}

// SAFETY: chunks are only reached through atomics and are never freed; the
// arena hands out shared references only.
unsafe impl Send for MetadataArena {}
unsafe impl Sync for MetadataArena {}

impl MetadataArena {
    /// Creates an arena whose chunks are at least `chunk_size` bytes.
    ///
    /// No memory is requested until the first allocation.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        MetadataArena {
            head: AtomicPtr::new(ptr::null_mut()),
            grow_lock: Mutex::new(()),
            chunk_size: chunk_size.max(MIN_CHUNK_SIZE).next_power_of_two(),
            allocated: AtomicUsize::new(0),
        }
    }

    /// Moves `value` into the arena and returns a reference valid for the
    /// arena's lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaAllocError`] if a new chunk is needed and the system
    /// allocator refuses it.
    pub fn try_alloc<T>(&self, value: T) -> Result<&T, ArenaAllocError> {
        let layout = Layout::new::<T>();
        let slot = self.reserve(layout.size(), layout.align())?.cast::<T>();

        // SAFETY: slot is a fresh, properly aligned region of size_of::<T>()
        // bytes that nothing else references.
        unsafe {
            ptr::write(slot.as_ptr(), value);
            Ok(&*slot.as_ptr())
        }
    }

    /// Moves `value` into the arena.
    ///
    /// # Panics
    ///
    /// Panics if the system allocator cannot provide a new chunk.
    pub fn alloc<T>(&self, value: T) -> &T {
        match self.try_alloc(value) {
            Ok(slot) => slot,
            Err(err) => panic!("{err}"),
        }
    }

    /// Copies `text` into the arena.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaAllocError`] when the arena cannot grow.
    pub fn try_alloc_str(&self, text: &str) -> Result<&str, ArenaAllocError> {
        if text.is_empty() {
            return Ok("");
        }

        let dst = self.reserve(text.len(), 1)?;

        // SAFETY: dst points at text.len() fresh bytes; the copy is valid
        // UTF-8 because it is a byte-for-byte copy of a &str.
        unsafe {
            ptr::copy_nonoverlapping(text.as_ptr(), dst.as_ptr(), text.len());
            let bytes = std::slice::from_raw_parts(dst.as_ptr(), text.len());
            Ok(std::str::from_utf8_unchecked(bytes))
        }
    }

    /// Copies `text` into the arena.
    ///
    /// # Panics
    ///
    /// Panics if the system allocator cannot provide a new chunk.
    pub fn alloc_str(&self, text: &str) -> &str {
        match self.try_alloc_str(text) {
            Ok(slot) => slot,
            Err(err) => panic!("{err}"),
        }
    }

    /// Returns a usage snapshot by walking the chunk chain.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let mut stats = ArenaStats {
            total_allocated: self.allocated.load(Ordering::Relaxed),
            ..ArenaStats::default()
        };

        let mut cursor = self.head.load(Ordering::Acquire).cast_const();
        while !cursor.is_null() {
            // SAFETY: every chunk in the chain is leaked and never freed.
            let chunk = unsafe { &*cursor };
            stats.chunk_count += 1;
            stats.total_capacity += chunk.capacity;
            cursor = chunk.previous;
        }

        stats
    }

    /// Returns true if `ptr` points into memory owned by this arena.
    #[must_use]
    pub fn contains<T>(&self, ptr: *const T) -> bool {
        let addr = ptr.addr();
        let mut cursor = self.head.load(Ordering::Acquire).cast_const();

        while !cursor.is_null() {
            // SAFETY: chunks are never freed.
            let chunk = unsafe { &*cursor };
            if addr >= chunk.base_addr() && addr < chunk.limit {
                return true;
            }
            cursor = chunk.previous;
        }

        false
    }

    fn reserve(
        &self,
        size: usize,
        align: usize,
    ) -> Result<NonNull<u8>, ArenaAllocError> {
        let size = size.max(1);

        loop {
            let head = self.head.load(Ordering::Acquire);
            if !head.is_null() {
                // SAFETY: head is a leaked chunk.
                if let Some(slot) = unsafe { &*head }.bump(size, align) {
                    self.allocated.fetch_add(size, Ordering::Relaxed);
                    return Ok(slot);
                }
            }

            self.grow(head, size + align)?;
        }
    }

    #[cold]
    fn grow(
        &self,
        observed: *mut Chunk,
        min_size: usize,
    ) -> Result<(), ArenaAllocError> {
        let _guard = self
            .grow_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Someone else already installed a fresh chunk.
        if self.head.load(Ordering::Acquire) != observed {
            return Ok(());
        }

        let capacity = self.chunk_size.max(min_size.next_power_of_two());
        let chunk = Chunk::create(capacity, observed.cast_const())?;
        self.head
            .store(ptr::from_ref(chunk).cast_mut(), Ordering::Release);

        Ok(())
    }
}

impl std::fmt::Debug for MetadataArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataArena")
            .field("chunk_size", &self.chunk_size)
            .field("stats", &self.stats())
            .finish()
    }
}

static GLOBAL_ARENA: OnceLock<MetadataArena> = OnceLock::new();

/// Returns the process-wide metadata arena.
///
/// Initialized on first use with [`GLOBAL_CHUNK_SIZE`] chunks and never torn
/// down, so every reference it returns is `'static`.
#[must_use]
pub fn global_arena() -> &'static MetadataArena {
    GLOBAL_ARENA.get_or_init(|| MetadataArena::new(GLOBAL_CHUNK_SIZE))
}
