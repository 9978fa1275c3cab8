//! The coinledger server: configuration, command dispatch, sessions and the
//! TCP loop that ties them together.

pub mod config;
pub mod dispatcher;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError};
pub use dispatcher::{CommandError, Dispatcher, Outcome};
pub use server::{Server, ServerHandle};
pub use session::{ConnectionId, Session, SessionRegistry};

use coinledger_cache::AssetCache;
use coinledger_core::password::PasswordHasher;
use coinledger_core::{AssetSource, UserStore};

/// Wire a dispatcher from config and run the server until stopped.
pub async fn start_server<S: AssetSource>(
    config: &Config,
    users: Box<dyn UserStore>,
    source: S,
) -> std::io::Result<()> {
    let assets = AssetCache::new(source, config.cache.ttl_minutes, config.cache.limit);
    let dispatcher = Dispatcher::new(
        users,
        assets,
        PasswordHasher::with_cost(config.store.bcrypt_cost),
    );
    let server = Server::bind(config.server.bind_addr(), dispatcher).await?;
    let handle = server.handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping");
            handle.stop();
        }
    });

    server.run().await
}
