pub mod table_store;

pub use table_store::{SqlTableStore, StoreConfig, TableStore};
