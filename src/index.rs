//! The layered posting store.
//!
//! From the bottom up: [`posting`] defines the primitive position and
//! occurrence sets; [`term`] the generic term-index capability and its
//! in-memory implementation; [`keyed`] and [`compressed`] the proxies that
//! change key and value representation; [`context`] fans operations across
//! one index per context and owns the context-type registry.

pub mod compressed;
pub mod context;
pub mod keyed;
pub mod posting;
pub mod term;

pub use compressed::{CompressedIndex, CompressedOccurrences};
pub use context::{AnyIndex, ContextIndex, ContextType, RawResult, TypeRegistry};
pub use keyed::{IntKeyCodec, KeyCodec, KeyedIndex, PositionKeyCodec};
pub use posting::{Occurrences, Positions};
pub use term::{BTreeIndex, IndexKey, IndexValue, SearchMode, TermIndex};
