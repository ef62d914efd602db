pub mod executor;
pub mod manager;
pub mod store;

pub use executor::{DeleteOptions, Executor, MutationError};
pub use manager::DatabaseManager;
pub use store::{MySqlStore, RelationalStore, Row, Statement, StoreError, StoreTransaction};
