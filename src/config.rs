use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    File,
    Postgres,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "" => Ok(StoreKind::File),
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            other => Err(format!("STORE_BACKEND must be file or postgres, got {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub max_upload_mb: u64,
    pub sync_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreKind::File,
            database_url: None,
            data_dir: PathBuf::from("data"),
            host: "0.0.0.0".to_string(),
            port: 5001,
            max_upload_mb: 10,
            sync_interval: Duration::from_millis(1000),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        let store: StoreKind = std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "file".to_string())
            .parse()?;

        let database_url = std::env::var("DATABASE_URL").ok();
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err("DATABASE_URL must be set when STORE_BACKEND=postgres".into());
        }

        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let data_dir = base_dir.join(
            std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
        );

        let host = std::env::var("HOST").unwrap_or(defaults.host);
        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "5001".to_string())
            .parse()
            .unwrap_or(defaults.port);
        let max_upload_mb: u64 = std::env::var("MAX_UPLOAD_MB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_upload_mb);
        let sync_interval = std::env::var("SYNC_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.sync_interval);

        Ok(Self {
            store,
            database_url,
            data_dir,
            host,
            port,
            max_upload_mb,
            sync_interval,
        })
    }
}
