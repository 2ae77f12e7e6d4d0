//! Read-only views of a provisioned database.

use crate::engine::{Connector, Engine, EngineResult, RoleGrant};
use crate::error::{ProvisionError, ProvisionStep};
use crate::input::provision_request::{DatabaseConfiguration, ProvisionRequest};
use mongodb::bson::Document;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionReport {
    pub database: String,
    pub collections: Vec<String>,
    /// Key documents of the collection's indexes, without the `_id` index.
    pub indexes: Vec<Document>,
    pub documents: Vec<Document>,
}

impl ProvisionReport {
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }
}

fn is_id_index(keys: &Document) -> bool {
    keys.len() == 1 && keys.contains_key("_id")
}

pub async fn inspect<E: Engine + ?Sized>(
    engine: &E,
    collection: &str,
) -> EngineResult<ProvisionReport> {
    let collections = engine.list_collection_names().await?;
    let (indexes, documents) = if collections.iter().any(|c| c == collection) {
        let indexes = engine
            .list_index_keys(collection)
            .await?
            .into_iter()
            .filter(|keys| !is_id_index(keys))
            .collect();
        (indexes, engine.find_documents(collection).await?)
    } else {
        (vec![], vec![])
    };
    Ok(ProvisionReport {
        database: engine.database_name().to_string(),
        collections,
        indexes,
        documents,
    })
}

/// Logs in as the provisioned user, with the target database as the
/// authentication database, and returns the roles the server granted.
pub async fn verify_admin_login<C: Connector>(
    connector: &C,
    db_config: &DatabaseConfiguration,
    req: &ProvisionRequest,
) -> Result<Vec<RoleGrant>, ProvisionError> {
    let login = db_config.with_credentials(&req.user.username, &req.user.password, &req.database);
    let engine = connector
        .connect(&login, &req.database)
        .await
        .map_err(|e| ProvisionError::at(ProvisionStep::Connect, e))?;
    let mut roles = engine
        .authenticated_roles()
        .await
        .map_err(|e| ProvisionError::at(ProvisionStep::Inspect, e))?;
    roles.sort();
    Ok(roles)
}
