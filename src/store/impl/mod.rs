//! RegistrationStore implementations

pub mod sqlite;

pub use sqlite::SQLiteRegistrationStore;
