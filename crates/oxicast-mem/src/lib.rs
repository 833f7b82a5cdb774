//! Memory infrastructure for the `oxicast` runtime.
//!
//! Runtime type metadata is immutable and identity-compared, so it is placed
//! in a bump arena that lives for the whole process. See [`arena`].

pub mod arena;

pub use arena::{ArenaAllocError, ArenaStats, MetadataArena, global_arena};
