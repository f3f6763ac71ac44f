use std::str::FromStr;

use crate::errors::AppError;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_CASCADE_CONCURRENCY: usize = 8;
const DEFAULT_MAX_ORGANIZATIONS_PER_USER: i64 = 5;

/// How a cascading grant or revoke applies its descendant writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CascadeMode {
    /// The whole cascade (root plus every descendant) commits in one transaction.
    #[default]
    Transactional,
    /// Root first, then descendants as bounded concurrent tasks. A failure is
    /// reported after every task finishes; writes that already landed stay.
    Concurrent,
}

impl CascadeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeMode::Transactional => "transactional",
            CascadeMode::Concurrent => "concurrent",
        }
    }
}

impl FromStr for CascadeMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "transactional" => Ok(CascadeMode::Transactional),
            "concurrent" => Ok(CascadeMode::Concurrent),
            other => Err(AppError::configuration(format!(
                "CASCADE_MODE must be 'transactional' or 'concurrent', got '{other}'"
            ))),
        }
    }
}

/// Settings consumed by the authorization engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub cascade_mode: CascadeMode,
    /// Upper bound on in-flight descendant writes in concurrent mode.
    pub cascade_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cascade_mode: CascadeMode::default(),
            cascade_concurrency: DEFAULT_CASCADE_CONCURRENCY,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let cascade_mode = std::env::var("CASCADE_MODE")
            .map(|val| val.parse::<CascadeMode>())
            .unwrap_or(Ok(CascadeMode::default()))?;

        let cascade_concurrency = std::env::var("CASCADE_CONCURRENCY")
            .map(|val| val.parse::<usize>())
            .unwrap_or(Ok(DEFAULT_CASCADE_CONCURRENCY))
            .map_err(|_| AppError::configuration("CASCADE_CONCURRENCY must be a valid integer"))?;

        if cascade_concurrency == 0 {
            return Err(AppError::configuration("CASCADE_CONCURRENCY must be at least 1"));
        }

        Ok(Self { cascade_mode, cascade_concurrency })
    }

    pub fn with_mode(mut self, cascade_mode: CascadeMode) -> Self {
        self.cascade_mode = cascade_mode;
        self
    }
}

/// Settings consumed by the resource services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub engine: EngineConfig,
    pub max_organizations_per_user: i64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            max_organizations_per_user: DEFAULT_MAX_ORGANIZATIONS_PER_USER,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let max_organizations_per_user = std::env::var("MAX_ORGANIZATIONS_PER_USER")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(DEFAULT_MAX_ORGANIZATIONS_PER_USER))
            .map_err(|_| AppError::configuration("MAX_ORGANIZATIONS_PER_USER must be a valid integer"))?;

        Ok(Self {
            engine: EngineConfig::from_env()?,
            max_organizations_per_user,
        })
    }
}

/// Process-level settings for the server binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub service: ServiceConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| AppError::configuration("DATABASE_URL not set"))?;
        let port = std::env::var("APP_PORT")
            .map(|val| val.parse::<u16>())
            .unwrap_or(Ok(DEFAULT_PORT))
            .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?;

        Ok(Self {
            database_url,
            port,
            service: ServiceConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_mode_parsing() {
        assert_eq!("".parse::<CascadeMode>().unwrap(), CascadeMode::Transactional);
        assert_eq!("Concurrent".parse::<CascadeMode>().unwrap(), CascadeMode::Concurrent);
        assert!(matches!("eventual".parse::<CascadeMode>(), Err(AppError::Configuration(_))));
    }

    #[test]
    fn defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.engine.cascade_mode, CascadeMode::Transactional);
        assert_eq!(config.engine.cascade_concurrency, 8);
        assert_eq!(config.max_organizations_per_user, 5);
    }
}
