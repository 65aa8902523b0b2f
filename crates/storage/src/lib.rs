#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    ParticipationRepository, SnapshotStore, Storage, StorageError, SubmissionHistoryRepository,
};
