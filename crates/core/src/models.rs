use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::wallet::Wallet;

/// Separator between the top-level fields of a persisted record.
pub const FIELD_DELIMITER: char = ';';
/// Separator between `id=value` entries of a holdings map.
pub const ENTRIES_DELIMITER: char = ',';
/// Separator between an id and its value inside an entry.
pub const ENTRY_DELIMITER: char = '=';

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// A priced entry of the market catalog (e.g. BTC, ETH).
///
/// Snapshots are immutable; a catalog refresh replaces them wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub is_crypto: bool,
    /// Price in USD.
    pub price: Decimal,
}

impl Asset {
    pub fn new(id: &str, name: &str, is_crypto: bool, price: Decimal) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            is_crypto,
            price,
        }
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Errors raised while reading a persisted record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Malformed entry: '{0}'")]
    MalformedEntry(String),
    #[error("Failed to parse {field} '{value}'")]
    InvalidNumber { field: &'static str, value: String },
}

/// An account holder: credentials plus the wallet they own.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub wallet: Wallet,
}

impl User {
    /// A freshly signed-up user with an empty wallet.
    pub fn new(username: &str, password_hash: &str) -> Self {
        Self {
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            wallet: Wallet::default(),
        }
    }

    /// Whether `username` can be stored without breaking the record format.
    pub fn is_valid_username(username: &str) -> bool {
        !username.is_empty()
            && !username.contains([FIELD_DELIMITER, ENTRIES_DELIMITER, ENTRY_DELIMITER])
    }
}

/// Renders the one-line persisted form:
/// `username;password_hash;balance;investments;entry_prices`.
impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{FIELD_DELIMITER}{}{FIELD_DELIMITER}{}",
            self.username, self.password_hash, self.wallet
        )
    }
}

impl FromStr for User {
    type Err = RecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.splitn(3, FIELD_DELIMITER);
        let username = fields.next().ok_or(RecordError::MissingField("username"))?;
        let password_hash = fields
            .next()
            .ok_or(RecordError::MissingField("password_hash"))?;
        let wallet = fields
            .next()
            .ok_or(RecordError::MissingField("wallet"))?
            .parse()?;

        Ok(Self {
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            wallet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_user_record_round_trip() {
        let line = "alice;$2b$04$abcdefghijklmnopqrstuv;12.50;BTC=0.5,ETH=2;BTC=20000,ETH=1500.25";
        let user: User = line.parse().unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(user.password_hash, "$2b$04$abcdefghijklmnopqrstuv");
        assert_eq!(user.wallet.balance(), dec!(12.50));
        assert_eq!(user.to_string(), line);
    }

    #[test]
    fn test_new_user_record() {
        let user = User::new("bob", "hash");
        assert_eq!(user.to_string(), "bob;hash;0;;");
        assert_eq!("bob;hash;0;;".parse::<User>().unwrap(), user);
    }

    #[test]
    fn test_truncated_record_rejected() {
        assert_eq!(
            "carol".parse::<User>(),
            Err(RecordError::MissingField("password_hash"))
        );
        assert_eq!(
            "carol;hash".parse::<User>(),
            Err(RecordError::MissingField("wallet"))
        );
    }

    #[test]
    fn test_username_validation() {
        assert!(User::is_valid_username("alice"));
        assert!(!User::is_valid_username(""));
        assert!(!User::is_valid_username("al;ice"));
        assert!(!User::is_valid_username("al=ice"));
        assert!(!User::is_valid_username("al,ice"));
    }
}
