//! Boot-time environment configuration. Every recognized variable is parsed
//! and validated here; a bad value is a fatal error before any component
//! starts (spec §7: "Configuration errors at boot ... fatal").

use std::env;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{0} must be one of {1:?}, got {2:?}")]
    InvalidEnum(&'static str, &'static [&'static str], String),
    #[error("{0} must be a boolean flag (0 or 1), got {1:?}")]
    InvalidFlag(&'static str, String),
    #[error("{0} must be set together with {1}, or neither")]
    PartialPair(&'static str, &'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEnv {
    Development,
    Production,
    Test,
}

impl NodeEnv {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "development" => Ok(NodeEnv::Development),
            "production" => Ok(NodeEnv::Production),
            "test" => Ok(NodeEnv::Test),
            other => Err(ConfigError::InvalidEnum(
                "NODE_ENV",
                &["development", "production", "test"],
                other.to_owned(),
            )),
        }
    }

    #[must_use]
    pub fn default_log_level(self) -> &'static str {
        match self {
            NodeEnv::Development => "debug",
            NodeEnv::Production => "info",
            NodeEnv::Test => "warn",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub eqk_id: String,
    pub start_at: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node_env: NodeEnv,
    pub host: String,
    pub port: u16,
    pub cors: bool,
    pub swagger: bool,
    pub ingest_enabled: bool,
    pub database_url: String,
    pub redis_url: String,
    pub kma_api_key: Option<String>,
    pub kma_pews_sim: Option<SimulationConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let node_env = match env::var("NODE_ENV") {
            Ok(raw) => NodeEnv::parse(&raw)?,
            Err(_) => NodeEnv::Development,
        };

        let host = env::var("HOST").unwrap_or_else(|_| "localhost".to_owned());
        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidEnum("PORT", &[], raw))?,
            Err(_) => 3000,
        };

        let cors = parse_flag("CORS", false)?;
        let swagger = parse_flag("SWAGGER", true)?;
        let ingest_enabled = parse_flag("INGEST_ENABLED", false)?;

        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let redis_url = env::var("REDIS_URL").map_err(|_| ConfigError::Missing("REDIS_URL"))?;

        let kma_api_key = env::var("KMA_API_KEY").ok();

        let sim_eqk_id = env::var("KMA_PEWS_SIM_EQK_ID").ok();
        let sim_start_at = env::var("KMA_PEWS_SIM_START_AT").ok();
        let kma_pews_sim = match (sim_eqk_id, sim_start_at) {
            (Some(eqk_id), Some(start_at)) => Some(SimulationConfig { eqk_id, start_at }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::PartialPair(
                    "KMA_PEWS_SIM_EQK_ID",
                    "KMA_PEWS_SIM_START_AT",
                ));
            }
            (None, Some(_)) => {
                return Err(ConfigError::PartialPair(
                    "KMA_PEWS_SIM_START_AT",
                    "KMA_PEWS_SIM_EQK_ID",
                ));
            }
        };

        Ok(Self {
            node_env,
            host,
            port,
            cors,
            swagger,
            ingest_enabled,
            database_url,
            redis_url,
            kma_api_key,
            kma_pews_sim,
        })
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.as_str() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(ConfigError::InvalidFlag(name, other.to_owned())),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_env_rejects_unknown_values() {
        assert!(NodeEnv::parse("staging").is_err());
        assert!(NodeEnv::parse("production").is_ok());
    }

    #[test]
    fn default_log_levels_match_environment() {
        assert_eq!(NodeEnv::Development.default_log_level(), "debug");
        assert_eq!(NodeEnv::Production.default_log_level(), "info");
        assert_eq!(NodeEnv::Test.default_log_level(), "warn");
    }
}
