use chrono::Duration;
use mongodb::Client as MongoClient;
use rocket::futures::TryFutureExt;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    api::admin::AdminCredentials,
    db::{
        admin::ensure_admin_exists, candidate::ensure_candidates_exist, candidate::Candidate,
        settings::ensure_settings_exist,
    },
    mongodb::{ensure_indexes_exist, Coll},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    session_ttl: u32,
    secure_cookies: bool,
    // secrets
    session_secret: String,
}

impl Config {
    /// Valid lifetime of admin session cookies in seconds.
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl.into())
    }

    /// Whether cookies should carry the `Secure` attribute.
    /// On in release builds, where the server sits behind TLS.
    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    /// Secret key used to sign admin sessions.
    pub fn session_secret(&self) -> &[u8] {
        self.session_secret.as_bytes()
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
        if config.session_secret.is_empty() {
            error!("`session_secret` must not be empty");
            return Err(rocket);
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// Data written into a fresh database on launch.
#[derive(Deserialize)]
struct SeedConfig {
    // non-secrets
    admin_email: String,
    #[serde(default)]
    candidates: Vec<Candidate>,
    // secrets
    admin_password: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a `Database`
/// into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let (config, seed) = match rocket
            .figment()
            .extract::<DbConfig>()
            .and_then(|config| Ok((config, rocket.figment().extract::<SeedConfig>()?)))
        {
            Ok(configs) => configs,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name());

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to connect to database: {e}");
            return Err(rocket);
        }

        // Ensure the settings singleton, the candidates and at least one admin exist.
        let default_admin = AdminCredentials::new(&seed.admin_email, seed.admin_password);
        let admins = Coll::from_db(&db);
        let settings = Coll::from_db(&db);
        let candidates = Coll::from_db(&db);
        if let Err(e) = ensure_settings_exist(&settings)
            .and_then(|_| ensure_candidates_exist(&candidates, &seed.candidates))
            .and_then(|_| ensure_admin_exists(&admins, default_admin))
            .await
        {
            error!("Failed to seed database: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name() -> String {
    "pemira".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Config {
        pub fn example() -> Self {
            Self {
                session_ttl: 60,
                secure_cookies: false,
                session_secret: "unit-test-session-secret".to_string(),
            }
        }
    }
}
