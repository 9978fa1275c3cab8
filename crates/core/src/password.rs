//! Salted, irreversible password hashing.

use tracing::warn;

/// Lowest cost bcrypt accepts.
pub const MIN_COST: u32 = 4;
const MAX_COST: u32 = 31;
pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

/// Hashing failed (bad cost or RNG failure).
#[derive(Debug, thiserror::Error)]
#[error("Could not hash password")]
pub struct HashError(#[from] bcrypt::BcryptError);

/// Hashes and verifies passwords with bcrypt at a fixed cost.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            cost: DEFAULT_COST,
        }
    }
}

impl PasswordHasher {
    /// `cost` is clamped into bcrypt's supported range.
    pub fn with_cost(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_COST, MAX_COST),
        }
    }

    pub fn hash(&self, password: &str) -> Result<String, HashError> {
        Ok(bcrypt::hash(password, self.cost)?)
    }

    /// A malformed stored hash counts as a mismatch.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match bcrypt::verify(password, hash) {
            Ok(matches) => matches,
            Err(e) => {
                warn!(error = %e, "Stored password hash could not be checked");
                false
            }
        }
    }
}
