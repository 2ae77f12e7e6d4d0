//! The engine boundary over the official MongoDB driver.

pub mod engine;
pub mod info;

use crate::client::build_client;
use crate::client::config::ClientConfig;
use crate::engine::{Connector, EngineError, EngineResult};
use crate::input::provision_request::DatabaseConfiguration;
use async_trait::async_trait;
use log::debug;
use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use std::time::Duration;

pub use engine::MongoEngine;

impl From<mongodb::error::Error> for EngineError {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::Command(command) => EngineError {
                code: Some(command.code),
                code_name: Some(command.code_name.clone()),
                message: command.message.clone(),
            },
            ErrorKind::Write(WriteFailure::WriteError(write)) => EngineError {
                code: Some(write.code),
                code_name: write.code_name.clone(),
                message: write.message.clone(),
            },
            _ => EngineError::other(err.to_string()),
        }
    }
}

/// Connects to a live server. TLS settings are taken from each
/// [`DatabaseConfiguration`] so the same connector serves the admin login and
/// the re-authentication check.
#[derive(Debug, Clone, Default)]
pub struct MongoConnector {
    server_selection_timeout: Option<Duration>,
}

impl MongoConnector {
    pub fn new(server_selection_timeout: Option<Duration>) -> Self {
        MongoConnector {
            server_selection_timeout,
        }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    type Engine = MongoEngine;

    async fn connect(
        &self,
        db_config: &DatabaseConfiguration,
        database: &str,
    ) -> EngineResult<MongoEngine> {
        let client_config = ClientConfig::builder()
            .use_tls(db_config.use_tls())
            .tls_cert_opt(db_config.tls_cert.clone())
            .server_selection_timeout_opt(self.server_selection_timeout)
            .build();
        let client = build_client(db_config, &client_config).await?;

        // The driver connects lazily; a ping forces server selection and
        // authentication so bad credentials fail here.
        client
            .database(&db_config.authentication_database)
            .run_command(doc! { "ping": 1 })
            .await?;
        debug!(
            "Authenticated against {}, selecting database {}",
            db_config.authentication_database, database
        );

        Ok(MongoEngine::new(client, database))
    }
}
