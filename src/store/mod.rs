pub mod sqlite;

pub use sqlite::{SqliteStore, TokenDetails, TokenRow};
