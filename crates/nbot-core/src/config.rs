use std::{env, net::SocketAddr, time::Duration};

use crate::{domain::UserId, errors::Error, Result};

/// Typed configuration for the notification bot.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,
    pub operator_id: UserId,

    // Storage
    pub database_url: String,
    pub database_max_connections: u32,

    // Broadcast
    pub broadcast_send_timeout: Option<Duration>,
    pub broadcast_concurrency: usize,

    // Transport
    pub webhook: Option<WebhookConfig>,
}

/// Webhook mode settings. Absent means long polling.
#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub base_url: String,
    pub path: String,
    pub secret: Option<String>,
    pub port: u16,
}

impl WebhookConfig {
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Existing process env always wins over `.env`.
        dotenv::dotenv().ok();

        // Required env vars
        let bot_token = env_str("BOT_TOKEN")
            .and_then(non_empty)
            .or_else(|| env_str("TELEGRAM_BOT_TOKEN").and_then(non_empty))
            .ok_or_else(|| {
                Error::Config("BOT_TOKEN environment variable is required".to_string())
            })?;
        let operator_id = parse_operator_id(env_str("ADMIN_ID"))?;

        // Storage
        let database_url = env_str("DATABASE_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| {
                let name = env_str("DATABASE_NAME")
                    .and_then(non_empty)
                    .unwrap_or("bot_users.db".to_string());
                sqlite_url_for(&name)
            });
        let database_max_connections = env_u32("DATABASE_MAX_CONNECTIONS").unwrap_or(5).max(1);

        // Broadcast
        let broadcast_send_timeout =
            timeout_from_ms(env_u64("BROADCAST_SEND_TIMEOUT_MS").unwrap_or(10_000));
        let broadcast_concurrency = env_usize("BROADCAST_CONCURRENCY").unwrap_or(1).max(1);

        // Webhook mode is opt-in via a public base URL.
        let webhook = match env_str("WEBHOOK_BASE_URL").and_then(non_empty) {
            Some(base_url) => Some(WebhookConfig {
                base_url,
                path: normalize_path(env_str("WEBHOOK_PATH").unwrap_or("/webhook".to_string())),
                secret: env_str("WEBHOOK_SECRET").and_then(non_empty),
                port: env_u16("PORT").unwrap_or(8080),
            }),
            None => None,
        };

        Ok(Self {
            bot_token,
            operator_id,
            database_url,
            database_max_connections,
            broadcast_send_timeout,
            broadcast_concurrency,
            webhook,
        })
    }
}

fn parse_operator_id(raw: Option<String>) -> Result<UserId> {
    let raw = raw.and_then(non_empty).ok_or_else(|| {
        Error::Config("ADMIN_ID environment variable is required".to_string())
    })?;
    match raw.trim().parse::<i64>() {
        Ok(0) => Err(Error::Config("ADMIN_ID must be non-zero".to_string())),
        Ok(id) => Ok(UserId(id)),
        Err(_) => Err(Error::Config(format!("ADMIN_ID is not an integer: {raw}"))),
    }
}

fn sqlite_url_for(name: &str) -> String {
    if name.starts_with("sqlite:") {
        name.to_string()
    } else {
        format!("sqlite://{name}")
    }
}

fn timeout_from_ms(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

fn normalize_path(p: String) -> String {
    let p = p.trim();
    if p.starts_with('/') {
        p.to_string()
    } else {
        format!("/{p}")
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_u16(key: &str) -> Option<u16> {
    env_str(key).and_then(|s| s.trim().parse::<u16>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
