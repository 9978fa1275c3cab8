pub mod coinapi;
pub mod csv_source;
pub mod user_store;

pub use coinapi::{CoinApiConfig, CoinApiSource};
pub use csv_source::CsvAssetSource;
pub use user_store::{FileUserStore, MemoryUserStore};
