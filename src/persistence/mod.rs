//! Persistence module - On-disk storage of user profiles

mod profile_store;

pub use profile_store::ProfileStore;
