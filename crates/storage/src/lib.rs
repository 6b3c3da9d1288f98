#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    InMemoryStateStore, SessionField, SessionStateStore, Storage, StorageError, load_session,
    save_fields, save_session,
};
pub use sqlite::{SqliteInitError, SqliteStateStore};
