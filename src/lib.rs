#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{figment::Figment, Build, Rocket};

use crate::config::{BootstrapFairing, ConfigFairing, StoreFairing};
use crate::logging::LoggerFairing;
use crate::store::Storage;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;

/// The server, configured from `Rocket.toml` and the environment.
pub fn build() -> Rocket<Build> {
    base(rocket::Config::figment())
        .attach(StoreFairing)
        .attach(BootstrapFairing)
}

/// The server running against an already opened store.
pub fn rocket_for_storage(figment: Figment, storage: Storage) -> Rocket<Build> {
    base(figment).manage(storage).attach(BootstrapFairing)
}

fn base(figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .mount("/api", api::routes())
        .register("/", api::catchers())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
}

/// Configuration for tests, independent of any `Rocket.toml`.
#[cfg(test)]
pub(crate) fn test_figment() -> Figment {
    rocket::Config::figment()
        .merge(("jwt_secret", "test secret"))
        .merge(("auth_ttl", 3600))
        .merge(("strict_voting", false))
}

#[cfg(test)]
pub(crate) fn test_rocket(storage: Storage) -> Rocket<Build> {
    rocket_for_storage(test_figment(), storage)
}
