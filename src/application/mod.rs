//! Application services: hydration, thread assembly, pagination, and the
//! storage seams they consume.

pub mod error;
pub mod hydration;
pub mod pagination;
pub mod store;
pub mod thread;

pub use error::EngineError;
pub use hydration::{HydrationState, Hydrator};
pub use pagination::{CursorPage, PageRequest, PaginationError, RankCursor, TimeCursor, paginate};
pub use store::{RecordStore, StoreError};
pub use thread::{SortMode, ThreadAssembler, ThreadParams};
