pub mod models;
pub mod password;
pub mod traits;
pub mod wallet;

pub use models::*;
pub use traits::*;
pub use wallet::*;
