use std::env;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const DB_POOL_SIZE: &str = "BOTDESK_DB_POOL_SIZE";
    // Shared secret the platform gateway presents as a bearer token (unset = open)
    pub const GATEWAY_TOKEN: &str = "BOTDESK_GATEWAY_TOKEN";
    pub const RECOMPUTE_ON_START: &str = "BOTDESK_RECOMPUTE_ON_START";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 8080;
    pub const DATABASE_URL: &str = "./.db/botdesk.db";
    pub const DB_POOL_SIZE: u32 = 8;
}

fn flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub db_pool_size: u32,
    pub gateway_token: Option<String>,
    pub recompute_on_start: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var(env_vars::PORT)
            .ok()
            .and_then(|v| {
                v.parse()
                    .map_err(|_| log::warn!("Invalid {} '{}', using {}", env_vars::PORT, v, defaults::PORT))
                    .ok()
            })
            .unwrap_or(defaults::PORT);

        Self {
            port,
            database_url: env::var(env_vars::DATABASE_URL)
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_string()),
            db_pool_size: env::var(env_vars::DB_POOL_SIZE)
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults::DB_POOL_SIZE),
            gateway_token: env::var(env_vars::GATEWAY_TOKEN)
                .ok()
                .filter(|t| !t.trim().is_empty()),
            recompute_on_start: flag(env_vars::RECOMPUTE_ON_START),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: defaults::PORT,
            database_url: defaults::DATABASE_URL.to_string(),
            db_pool_size: defaults::DB_POOL_SIZE,
            gateway_token: None,
            recompute_on_start: false,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("db_pool_size", &self.db_pool_size)
            .field("gateway_token", &self.gateway_token.as_ref().map(|_| "<redacted>"))
            .field("recompute_on_start", &self.recompute_on_start)
            .finish()
    }
}
