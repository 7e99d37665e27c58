use anyhow::Context;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_HISTORY_LIMIT: i64 = 10;
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub history_limit: i64,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set to a Postgres instance")?;

        let max_connections = match lookup("GRADESIM_MAX_CONNECTIONS") {
            Some(value) => value
                .parse()
                .with_context(|| format!("GRADESIM_MAX_CONNECTIONS is not a number: {value}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let history_limit: i64 = match lookup("GRADESIM_HISTORY_LIMIT") {
            Some(value) => value
                .parse()
                .with_context(|| format!("GRADESIM_HISTORY_LIMIT is not a number: {value}"))?,
            None => DEFAULT_HISTORY_LIMIT,
        };
        if history_limit < 1 {
            anyhow::bail!("GRADESIM_HISTORY_LIMIT must be at least 1");
        }

        let log_filter =
            lookup("GRADESIM_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            database_url,
            max_connections,
            history_limit,
            log_filter,
        })
    }
}
