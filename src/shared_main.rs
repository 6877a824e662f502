use std::{env, path::PathBuf};

use crate::{
    ai_assistant::{AiClient, AiConfig},
    data_types::UserContext,
    db_operations::Database,
    errors::PlannerError,
};

/// Info by default; the crate's own module logs at debug level when `RUST_LOG=debug`.
pub fn logger_init(module: &str) {
    pretty_env_logger::formatted_timed_builder()
        .filter_level(log::LevelFilter::Info)
        .filter_module(
            module,
            if env::var(pretty_env_logger::env_logger::DEFAULT_FILTER_ENV).unwrap_or_default()
                == "debug"
            {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            },
        )
        .init();
}

/// Everything the front ends resolve from flags and environment before running.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub user: Option<String>,
    pub ai: AiConfig,
}

impl Config {
    /// The signed-in user; missing or blank ids are refused before any store access.
    pub fn user_context(&self) -> Result<UserContext, PlannerError> {
        match self.user.as_deref() {
            Some(uid) => UserContext::new(uid),
            None => Err(PlannerError::NotAuthenticated),
        }
    }

    pub fn open_database(&self) -> Result<Database, PlannerError> {
        log::debug!("opening store at {}", self.db_path.display());
        Database::open(&self.db_path)
    }

    pub fn ai_client(&self) -> AiClient {
        AiClient::new(self.ai.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_user_is_not_authenticated() {
        let config = Config {
            db_path: PathBuf::from(":memory:"),
            user: None,
            ai: AiConfig::default(),
        };
        assert!(matches!(
            config.user_context(),
            Err(PlannerError::NotAuthenticated)
        ));

        let config = Config {
            user: Some("  ".to_string()),
            ..config
        };
        assert!(config.user_context().is_err());
    }
}
