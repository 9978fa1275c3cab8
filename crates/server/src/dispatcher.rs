use coinledger_cache::{AssetCache, CacheError};
use coinledger_core::password::{HashError, PasswordHasher};
use coinledger_core::{AssetSource, StoreError, User, UserStore, WalletError};
use coinledger_protocol::validator::LOG_IN_FIRST;
use coinledger_protocol::{validate, Command, CommandKind};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, info};

pub const UNKNOWN_COMMAND: &str = "Unknown command";
pub const USER_CREATED: &str = "New user created";
pub const LOGGED_OUT: &str = "Logged out successfully";
pub const GOODBYE: &str = "Goodbye";

const DECOY_PASSWORD: &str = "coinledger-decoy";

// ---------------------------------------------------------------------------
// Outcome / CommandError
// ---------------------------------------------------------------------------

/// What a handler produced. Session-changing outcomes are interpreted by the
/// connection layer; everything else is sent as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reply(String),
    /// Credentials matched for this username.
    LoggedIn(String),
    LoggedOut(String),
    Exit(String),
}

/// Everything a command can fail with. `Display` is the client-facing text.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Rejected(String),
    #[error("Invalid argument. Only numbers allowed")]
    MalformedNumber,
    #[error("Incorrect username or password")]
    BadCredentials,
    #[error("Username contains illegal characters")]
    InvalidUsername,
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Hash(#[from] HashError),
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Validates and executes one command on behalf of a session.
pub struct Dispatcher<S> {
    users: Box<dyn UserStore>,
    assets: AssetCache<S>,
    hasher: PasswordHasher,
    /// Checked against when the username is unknown, so a miss costs as much
    /// as a wrong password.
    decoy_hash: Option<String>,
}

impl<S: AssetSource> Dispatcher<S> {
    pub fn new(users: Box<dyn UserStore>, assets: AssetCache<S>, hasher: PasswordHasher) -> Self {
        Self {
            users,
            assets,
            hasher,
            decoy_hash: None,
        }
    }

    /// Run `command` for the session identified by `identity` and render the
    /// result. Validation failures return before any handler runs.
    pub async fn execute(&mut self, identity: Option<&str>, command: &Command) -> Outcome {
        let user = identity.and_then(|name| self.users.get(name));

        let result = match validate(user.as_ref().map(|u| u.username.as_str()), command) {
            Some(message) => Err(CommandError::Rejected(message)),
            None => self.dispatch(user, command).await,
        };

        result.unwrap_or_else(|e| {
            debug!(command = %command.name, error = %e, "Command failed");
            Outcome::Reply(e.to_string())
        })
    }

    async fn dispatch(
        &mut self,
        user: Option<User>,
        command: &Command,
    ) -> Result<Outcome, CommandError> {
        let Some(kind) = command.kind() else {
            return Ok(Outcome::Reply(UNKNOWN_COMMAND.to_string()));
        };
        let args = &command.args;

        match kind {
            CommandKind::SignUp => self.sign_up(&args[0], &args[1]),
            CommandKind::LogIn => self.log_in(&args[0], &args[1]),
            CommandKind::List => self.list().await,
            CommandKind::Deposit => self.deposit(signed_in(user)?, &args[0]),
            CommandKind::Buy => self.buy(signed_in(user)?, &args[0], &args[1]).await,
            CommandKind::Sell => self.sell(signed_in(user)?, &args[0]).await,
            CommandKind::Summary => self.summary(signed_in(user)?).await,
            CommandKind::Trends => self.trends(signed_in(user)?).await,
            CommandKind::LogOut => Ok(Outcome::LoggedOut(LOGGED_OUT.to_string())),
            CommandKind::Exit => Ok(Outcome::Exit(GOODBYE.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    fn sign_up(&mut self, username: &str, password: &str) -> Result<Outcome, CommandError> {
        if !User::is_valid_username(username) {
            return Err(CommandError::InvalidUsername);
        }
        if self.users.get(username).is_some() {
            return Err(StoreError::DuplicateUser.into());
        }

        let hash = self.hasher.hash(password)?;
        self.users.add(User::new(username, &hash))?;
        info!(username, "New user created");
        Ok(Outcome::Reply(USER_CREATED.to_string()))
    }

    fn log_in(&mut self, username: &str, password: &str) -> Result<Outcome, CommandError> {
        match self.users.get(username) {
            Some(user) if self.hasher.verify(password, &user.password_hash) => {
                Ok(Outcome::LoggedIn(user.username))
            }
            Some(_) => Err(CommandError::BadCredentials),
            None => {
                self.verify_decoy(password);
                Err(CommandError::BadCredentials)
            }
        }
    }

    fn verify_decoy(&mut self, password: &str) {
        if self.decoy_hash.is_none() {
            self.decoy_hash = self.hasher.hash(DECOY_PASSWORD).ok();
        }
        if let Some(decoy) = &self.decoy_hash {
            let _ = self.hasher.verify(password, decoy);
        }
    }

    async fn list(&mut self) -> Result<Outcome, CommandError> {
        let lines: Vec<String> = self
            .assets
            .get_assets()
            .await?
            .iter()
            .map(|asset| format!("{}: {}", asset.id, asset.price))
            .collect();
        Ok(Outcome::Reply(lines.join("\n")))
    }

    fn deposit(&mut self, mut user: User, amount: &str) -> Result<Outcome, CommandError> {
        let amount = parse_amount(amount)?;
        let balance = user.wallet.deposit(amount)?;
        self.users.update(&user)?;
        Ok(Outcome::Reply(format!(
            "Money successfully deposited. Current balance: {balance}"
        )))
    }

    async fn buy(
        &mut self,
        mut user: User,
        asset_id: &str,
        amount: &str,
    ) -> Result<Outcome, CommandError> {
        let amount = parse_amount(amount)?;
        let asset = self.assets.get_asset(asset_id).await?;

        let quantity = user.wallet.buy(&asset.id, amount, asset.price)?;
        self.users.update(&user)?;
        info!(
            username = %user.username,
            asset = %asset.id,
            quantity = %quantity,
            price = %asset.price,
            "Bought"
        );
        Ok(Outcome::Reply(format!(
            "{} bought. Balance left: {}",
            asset.name,
            user.wallet.balance()
        )))
    }

    async fn sell(&mut self, mut user: User, asset_id: &str) -> Result<Outcome, CommandError> {
        let asset = self.assets.get_asset(asset_id).await?;

        let proceeds = user.wallet.sell(&asset.id, asset.price)?;
        self.users.update(&user)?;
        info!(
            username = %user.username,
            asset = %asset.id,
            proceeds = %proceeds,
            "Sold"
        );
        Ok(Outcome::Reply(format!(
            "{} sold. Current balance: {}",
            asset.name,
            user.wallet.balance()
        )))
    }

    async fn summary(&mut self, user: User) -> Result<Outcome, CommandError> {
        let prices = self.held_prices(&user).await?;
        Ok(Outcome::Reply(user.wallet.summary(&prices)))
    }

    async fn trends(&mut self, user: User) -> Result<Outcome, CommandError> {
        let prices = self.held_prices(&user).await?;
        Ok(Outcome::Reply(user.wallet.trends(&prices)))
    }

    /// Prices for the user's holdings only. A wallet with no holdings never
    /// touches the cache.
    async fn held_prices(
        &mut self,
        user: &User,
    ) -> Result<std::collections::HashMap<String, Decimal>, CommandError> {
        let holdings = user.wallet.holdings();
        if holdings.is_empty() {
            return Ok(Default::default());
        }
        Ok(self.assets.get_asset_prices(&holdings).await?)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The validator guarantees a user for auth-required commands; a session
/// whose user vanished from the store is treated as logged out.
fn signed_in(user: Option<User>) -> Result<User, CommandError> {
    user.ok_or_else(|| CommandError::Rejected(LOG_IN_FIRST.to_string()))
}

/// Parse a money argument. Plain and scientific notation are accepted.
fn parse_amount(raw: &str) -> Result<Decimal, CommandError> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| CommandError::MalformedNumber)
}
