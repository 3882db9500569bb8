use chrono::Duration;
use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::error::Result;
use crate::model::{
    directory, election,
    user::{RegNum, Role, User, UserStatus},
};
use crate::store::{MemoryStore, MongoStore, SqliteStore, Storage};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: u32,
    #[serde(default)]
    strict_voting: bool,
    #[serde(default)]
    default_admin: DefaultAdmin,
    // secrets
    jwt_secret: String,
}

impl Config {
    /// Valid lifetime of session cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to sign session JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Whether votes are checked against the election state and the
    /// directory before being recorded.
    pub fn strict_voting(&self) -> bool {
        self.strict_voting
    }

    /// The admin account created at startup if its number is free.
    pub fn default_admin(&self) -> &DefaultAdmin {
        &self.default_admin
    }
}

/// Credentials of the bootstrap admin account.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultAdmin {
    pub reg_num: String,
    pub name: String,
    pub password: String,
}

impl Default for DefaultAdmin {
    fn default() -> Self {
        Self {
            reg_num: "ADMIN001".to_string(),
            name: "System Administrator".to_string(),
            password: "admin123".to_string(),
        }
    }
}

impl DefaultAdmin {
    /// The admin record to create, or `None` if the number is blank.
    pub fn to_user(&self) -> Option<User> {
        let reg_num = RegNum::parse(&self.reg_num)?;
        let mut admin = User::new(
            reg_num,
            self.name.clone(),
            self.password.clone(),
            Role::Admin,
        );
        admin.status = Some(UserStatus::Active);
        Some(admin)
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if config.strict_voting {
            info!("Strict voting enabled");
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Which store backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    Mongodb,
    Memory,
}

/// Configuration for the store.
#[derive(Debug, Deserialize)]
struct StoreConfig {
    // non-secrets
    store: Backend,
    #[serde(default = "default_sqlite_path")]
    sqlite_path: String,
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: Option<String>,
}

fn default_sqlite_path() -> String {
    "ovs.sqlite".to_string()
}

fn default_db_name() -> String {
    "ovs".to_string()
}

impl StoreConfig {
    async fn open(&self) -> Result<Storage> {
        let storage = match self.store {
            Backend::Sqlite => {
                info!("Opening SQLite database at {}", self.sqlite_path);
                Storage::new(SqliteStore::open(&self.sqlite_path).await?)
            }
            Backend::Mongodb => {
                let uri = self.db_uri.as_deref().unwrap_or("mongodb://localhost:27017");
                info!("Connecting to MongoDB database {}", self.db_name);
                Storage::new(MongoStore::connect(uri, &self.db_name).await?)
            }
            Backend::Memory => {
                warn!("Using the in-memory store; nothing will be persisted");
                Storage::new(MemoryStore::new())
            }
        };
        Ok(storage)
    }
}

/// A fairing that loads the store config, opens the configured backend, and
/// places a [`Storage`] handle into managed state.
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<StoreConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load store config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded store config, connecting...");

        // Open the backend.
        let storage = match config.open().await {
            Ok(storage) => storage,
            Err(e) => {
                error!("Failed to open store: {e}");
                return Err(rocket);
            }
        };
        info!("...store online!");

        Ok(rocket.manage(storage))
    }
}

/// A fairing that ensures the default admin account and the election
/// settings record exist. Must be attached after [`ConfigFairing`] and the
/// store is managed.
pub struct BootstrapFairing;

#[rocket::async_trait]
impl Fairing for BootstrapFairing {
    fn info(&self) -> Info {
        Info {
            name: "Bootstrap",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let (config, storage) = match (rocket.state::<Config>(), rocket.state::<Storage>()) {
            (Some(config), Some(storage)) => (config, storage),
            _ => {
                error!("Bootstrap requires both the config and the store");
                return Err(rocket);
            }
        };

        let result = bootstrap(config, storage).await;
        if let Err(e) = result {
            error!("Failed to bootstrap store: {e}");
            return Err(rocket);
        }
        Ok(rocket)
    }
}

/// Ensure the default admin and the election record exist.
///
/// This operation is idempotent.
async fn bootstrap(config: &Config, storage: &Storage) -> Result<()> {
    match config.default_admin().to_user() {
        Some(admin) => directory::ensure_admin_exists(storage, &admin).await?,
        None => warn!("Default admin has a blank registration number; skipping"),
    }
    election::ensure_exists(storage).await
}

#[cfg(test)]
impl Config {
    pub fn example() -> Self {
        Self::example_with_secret("test secret")
    }

    pub fn example_with_secret(secret: &str) -> Self {
        Self {
            auth_ttl: 3600,
            strict_voting: false,
            default_admin: DefaultAdmin::default(),
            jwt_secret: secret.to_string(),
        }
    }
}
