//! The fixed provisioning sequence.
//!
//! Steps run strictly in order and the first failure ends the run. Nothing
//! already done is rolled back: a run that fails at `create user` has still
//! dropped the database.

use crate::engine::{Connector, Engine};
use crate::error::{ProvisionError, ProvisionStep};
use crate::input::provision_request::{DatabaseConfiguration, ProvisionRequest};
use crate::inspect::{self, ProvisionReport};
use log::{debug, info};
use mongodb::options::{ConnectionString, HostInfo};
use serde::Serialize;
use std::time::Instant;

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionSummary {
    pub database: String,
    pub user: String,
    /// Whether an earlier incarnation of the user was dropped.
    pub user_replaced: bool,
    pub collection: String,
    pub indexes: Vec<String>,
    pub documents_inserted: usize,
}

pub struct Provisioner<C: Connector> {
    connector: C,
}

impl<C: Connector> Provisioner<C> {
    pub fn new(connector: C) -> Self {
        Provisioner { connector }
    }

    /// Connects with `db_config`, selects `req.database` and runs every step.
    /// The connection is dropped when this returns, whatever the outcome.
    pub async fn provision(
        &self,
        db_config: &DatabaseConfiguration,
        req: &ProvisionRequest,
    ) -> Result<ProvisionSummary, ProvisionError> {
        req.validate().map_err(ProvisionError::InvalidRequest)?;
        let begin = Instant::now();

        info!(
            "Connecting to {} as {} (authentication database {})",
            display_hosts(&db_config.endpoint),
            db_config.username.as_deref().unwrap_or("<anonymous>"),
            db_config.authentication_database
        );
        let engine = self
            .connector
            .connect(db_config, &req.database)
            .await
            .map_err(|e| ProvisionError::at(ProvisionStep::Connect, e))?;

        let summary = run_steps(&engine, req, begin).await?;
        info!(
            "{:?} Provisioned database {}: user {}, collection {} with {} index(es) and {} document(s)",
            begin.elapsed(),
            summary.database,
            summary.user,
            summary.collection,
            summary.indexes.len(),
            summary.documents_inserted
        );
        Ok(summary)
    }

    /// Reads back what a run left in `req.database`.
    pub async fn inspect(
        &self,
        db_config: &DatabaseConfiguration,
        req: &ProvisionRequest,
    ) -> Result<ProvisionReport, ProvisionError> {
        let engine = self
            .connector
            .connect(db_config, &req.database)
            .await
            .map_err(|e| ProvisionError::at(ProvisionStep::Connect, e))?;
        inspect::inspect(&engine, &req.collection.name)
            .await
            .map_err(|e| ProvisionError::at(ProvisionStep::Inspect, e))
    }
}

/// Steps 2 to 7 against an engine that is already connected to the target
/// database.
pub async fn run_steps<E: Engine + ?Sized>(
    engine: &E,
    req: &ProvisionRequest,
    begin: Instant,
) -> Result<ProvisionSummary, ProvisionError> {
    let database = engine.database_name().to_string();
    let collection = &req.collection;

    engine
        .drop_database()
        .await
        .map_err(|e| ProvisionError::at(ProvisionStep::DropDatabase, e))?;
    info!("{:?} Dropped database {}", begin.elapsed(), database);

    let user_replaced = drop_user_if_present(engine, &req.user.username).await?;

    engine
        .create_user(&req.user)
        .await
        .map_err(|e| ProvisionError::at(ProvisionStep::CreateUser, e))?;
    info!(
        "{:?} Created user {} with roles [{}]",
        begin.elapsed(),
        req.user.username,
        req.user.roles.join(", ")
    );

    engine
        .create_collection(&collection.name)
        .await
        .map_err(|e| ProvisionError::at(ProvisionStep::CreateCollection, e))?;
    info!("{:?} Created collection {}", begin.elapsed(), collection.name);

    let mut indexes = Vec::with_capacity(collection.indexes.len());
    for index in collection.indexes.iter() {
        let name = engine
            .create_index(&collection.name, index.keys())
            .await
            .map_err(|e| ProvisionError::at(ProvisionStep::CreateIndex, e))?;
        debug!("Created index {} on {}", name, collection.name);
        indexes.push(name);
    }
    if !indexes.is_empty() {
        info!(
            "{:?} Created index(es) {} on {}",
            begin.elapsed(),
            indexes.join(", "),
            collection.name
        );
    }

    for document in collection.seed_documents.iter() {
        engine
            .insert_document(&collection.name, document.clone())
            .await
            .map_err(|e| ProvisionError::at(ProvisionStep::InsertDocument, e))?;
    }
    info!(
        "{:?} Inserted {} seed document(s) into {}",
        begin.elapsed(),
        collection.seed_documents.len(),
        collection.name
    );

    Ok(ProvisionSummary {
        database,
        user: req.user.username.clone(),
        user_replaced,
        collection: collection.name.clone(),
        indexes,
        documents_inserted: collection.seed_documents.len(),
    })
}

/// Returns whether a user was dropped. Absence, whether seen by the existence
/// check or reported by the drop itself, is not an error.
async fn drop_user_if_present<E: Engine + ?Sized>(
    engine: &E,
    username: &str,
) -> Result<bool, ProvisionError> {
    let exists = engine
        .user_exists(username)
        .await
        .map_err(|e| ProvisionError::at(ProvisionStep::DropUser, e))?;
    if !exists {
        info!("User {} does not exist, nothing to drop", username);
        return Ok(false);
    }
    match engine.drop_user(username).await {
        Ok(()) => {
            info!("Dropped existing user {}", username);
            Ok(true)
        }
        Err(e) if e.is_user_not_found() => {
            debug!("User {} vanished before it could be dropped", username);
            Ok(false)
        }
        Err(e) => Err(ProvisionError::at(ProvisionStep::DropUser, e)),
    }
}

/// Host list of a connection string for logging. Credentials and options
/// are left out.
pub fn display_hosts(endpoint: &str) -> String {
    match ConnectionString::parse(endpoint) {
        Ok(parsed) => match parsed.host_info {
            HostInfo::HostIdentifiers(hosts) => hosts
                .iter()
                .map(|host| host.to_string())
                .collect::<Vec<String>>()
                .join(","),
            HostInfo::DnsRecord(name) => format!("{} (SRV)", name),
            #[allow(unreachable_patterns)]
            _ => "<unknown hosts>".to_string(),
        },
        Err(_) => "<invalid connection string>".to_string(),
    }
}
