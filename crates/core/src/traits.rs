use crate::models::*;
use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Asset Source Trait
// ---------------------------------------------------------------------------

/// Errors that can occur while fetching the market catalog.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid request")]
    BadRequest,
    #[error("Authentication error")]
    Unauthorized,
    #[error("Not enough permissions")]
    Forbidden,
    #[error("Too many requests")]
    TooManyRequests,
    #[error("Data not found")]
    NoData,
    #[error("Unexpected status code: {0}")]
    UnexpectedStatus(u16),
    #[error("Decode error: {0}")]
    Decode(String),
}

/// A remote (or local) catalog of priced assets.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Fetch the full catalog. No retries; one failure is surfaced as-is.
    async fn fetch(&self) -> Result<Vec<Asset>, SourceError>;
}

#[async_trait]
impl<S: AssetSource + ?Sized> AssetSource for Box<S> {
    async fn fetch(&self) -> Result<Vec<Asset>, SourceError> {
        (**self).fetch().await
    }
}

// ---------------------------------------------------------------------------
// User Store Trait
// ---------------------------------------------------------------------------

/// Errors that can occur in the user store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Username is taken")]
    DuplicateUser,
    #[error("Could not persist users")]
    Io(#[from] std::io::Error),
    #[error("Malformed user record on line {line}: {source}")]
    Record {
        line: usize,
        #[source]
        source: RecordError,
    },
}

/// Durable keyed persistence of users.
///
/// Every mutation is written through before returning.
pub trait UserStore: Send {
    /// Look up a user by name. Returns an owned snapshot.
    fn get(&self, username: &str) -> Option<User>;

    /// Insert a new user. Fails with `DuplicateUser` without side effects if
    /// the name is taken.
    fn add(&mut self, user: User) -> Result<(), StoreError>;

    /// Overwrite an existing user.
    fn update(&mut self, user: &User) -> Result<(), StoreError>;
}
