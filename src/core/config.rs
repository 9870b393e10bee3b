use dotenv::dotenv;
use std::env;
use std::str::FromStr;
use tracing::{info, warn};

const DEFAULT_JWT_SECRET: &str = "access_secret_key";
const DEFAULT_JWT_REFRESH_SECRET: &str = "refresh_secret_key";

#[derive(Debug, Clone)]
pub struct Config {
    /// Se assente il server usa lo store in memoria
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub max_connections: u32,
    pub connection_lifetime_secs: u64,
    /// Capacità della coda di uscita di ogni connessione WebSocket
    pub ws_outbound_capacity: usize,
    /// Chiusura della connessione dopo questo silenzio del client
    pub ws_idle_timeout_secs: u64,
    /// Tempo massimo per scrivere un frame su un client che non legge
    pub ws_write_timeout_secs: u64,
    pub app_env: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_refresh_secret: DEFAULT_JWT_REFRESH_SECRET.to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 3000,
            max_connections: 20,
            connection_lifetime_secs: 1800,
            ws_outbound_capacity: 256,
            ws_idle_timeout_secs: 300,
            ws_write_timeout_secs: 10,
            app_env: "development".to_string(),
        }
    }
}

impl Config {
    /// Carica la configurazione dalle variabili d'ambiente
    /// Chiama dotenv() automaticamente
    pub fn from_env() -> Result<Self, String> {
        dotenv().ok();
        let defaults = Config::default();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            warn!("JWT_SECRET not set, using default (not secure for production!)");
            defaults.jwt_secret.clone()
        });

        let jwt_refresh_secret = env::var("JWT_REFRESH_SECRET").unwrap_or_else(|_| {
            warn!("JWT_REFRESH_SECRET not set, using default (not secure for production!)");
            defaults.jwt_refresh_secret.clone()
        });

        let server_host = env::var("SERVER_HOST").unwrap_or(defaults.server_host);

        let server_port = parse_var("SERVER_PORT", defaults.server_port)
            .map_err(|_| "Invalid SERVER_PORT: must be a number between 0-65535".to_string())?;

        let max_connections = parse_var("MAX_DB_CONNECTIONS", defaults.max_connections)
            .map_err(|_| "Invalid MAX_DB_CONNECTIONS: must be a positive number".to_string())?;

        let connection_lifetime_secs =
            parse_var("DB_CONNECTION_LIFETIME_SECS", defaults.connection_lifetime_secs).map_err(
                |_| "Invalid DB_CONNECTION_LIFETIME_SECS: must be a positive number".to_string(),
            )?;

        let ws_outbound_capacity = parse_positive("WS_OUTBOUND_CAPACITY", defaults.ws_outbound_capacity)?;
        let ws_idle_timeout_secs = parse_positive("WS_IDLE_TIMEOUT_SECS", defaults.ws_idle_timeout_secs)?;
        let ws_write_timeout_secs = parse_positive("WS_WRITE_TIMEOUT_SECS", defaults.ws_write_timeout_secs)?;

        let app_env = env::var("APP_ENV").unwrap_or(defaults.app_env);

        Ok(Config {
            database_url,
            jwt_secret,
            jwt_refresh_secret,
            server_host,
            server_port,
            max_connections,
            connection_lifetime_secs,
            ws_outbound_capacity,
            ws_idle_timeout_secs,
            ws_write_timeout_secs,
            app_env,
        })
    }

    /// Logga la configurazione (nascondendo i segreti)
    pub fn print_info(&self) {
        info!(
            environment = %self.app_env,
            address = %format!("{}:{}", self.server_host, self.server_port),
            database = %self
                .database_url
                .as_deref()
                .map(Self::mask_url)
                .unwrap_or_else(|| "in-memory store".to_string()),
            max_db_connections = self.max_connections,
            connection_lifetime_secs = self.connection_lifetime_secs,
            ws_outbound_capacity = self.ws_outbound_capacity,
            ws_idle_timeout_secs = self.ws_idle_timeout_secs,
            ws_write_timeout_secs = self.ws_write_timeout_secs,
            "Server configuration loaded"
        );
        if self.jwt_secret == DEFAULT_JWT_SECRET || self.jwt_refresh_secret == DEFAULT_JWT_REFRESH_SECRET {
            warn!("USING DEFAULT JWT SECRETS (INSECURE!)");
        }
    }

    /// Maschera l'URL del database per il logging
    fn mask_url(url: &str) -> String {
        if let (Some(at_pos), Some(scheme_end)) = (url.find('@'), url.find("://")) {
            let scheme = &url[..scheme_end + 3];
            let after_at = &url[at_pos..];
            return format!("{}***{}", scheme, after_at);
        }
        "***".to_string()
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, T::Err> {
    parse_value(env::var(name).ok().as_deref(), default)
}

fn parse_value<T: FromStr>(raw: Option<&str>, default: T) -> Result<T, T::Err> {
    match raw {
        Some(raw) => raw.trim().parse::<T>(),
        None => Ok(default),
    }
}

/// Come `parse_var`, ma zero (o un valore non numerico) è un errore
fn parse_positive<T: FromStr + PartialOrd + Default>(name: &str, default: T) -> Result<T, String> {
    positive_value(name, env::var(name).ok().as_deref(), default)
}

fn positive_value<T: FromStr + PartialOrd + Default>(
    name: &str,
    raw: Option<&str>,
    default: T,
) -> Result<T, String> {
    parse_value(raw, default)
        .ok()
        .filter(|value| *value > T::default())
        .ok_or_else(|| format!("Invalid {name}: must be a positive number"))
}
