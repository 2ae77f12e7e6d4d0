use super::info::{ConnectionStatus, UsersInfo};
use crate::engine::{Engine, EngineError, EngineResult, RoleGrant};
use crate::input::provision_request::AdminUser;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, from_document, Document};
use mongodb::{Client, Database, IndexModel};

/// One authenticated client with a selected database. The database handle
/// owns its client; dropping the engine releases the connection pool.
#[derive(Debug, Clone)]
pub struct MongoEngine {
    db: Database,
}

impl MongoEngine {
    pub fn new(client: Client, database: &str) -> Self {
        MongoEngine {
            db: client.database(database),
        }
    }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

#[async_trait]
impl Engine for MongoEngine {
    fn database_name(&self) -> &str {
        self.db.name()
    }

    async fn drop_database(&self) -> EngineResult<()> {
        self.db.drop().await?;
        Ok(())
    }

    async fn user_exists(&self, username: &str) -> EngineResult<bool> {
        let reply = self.db.run_command(doc! { "usersInfo": username }).await?;
        let info: UsersInfo = from_document(reply).map_err(EngineError::decode)?;
        Ok(!info.users.is_empty())
    }

    async fn drop_user(&self, username: &str) -> EngineResult<()> {
        self.db.run_command(doc! { "dropUser": username }).await?;
        Ok(())
    }

    async fn create_user(&self, user: &AdminUser) -> EngineResult<()> {
        self.db
            .run_command(doc! {
                "createUser": user.username.as_str(),
                "pwd": user.password.as_str(),
                "roles": user.roles.clone(),
            })
            .await?;
        Ok(())
    }

    async fn create_collection(&self, name: &str) -> EngineResult<()> {
        self.db.create_collection(name).await?;
        Ok(())
    }

    async fn create_index(&self, collection: &str, keys: Document) -> EngineResult<String> {
        let mut index_model = IndexModel::default();
        index_model.keys = keys;
        let created = self.collection(collection).create_index(index_model).await?;
        Ok(created.index_name)
    }

    async fn insert_document(&self, collection: &str, document: Document) -> EngineResult<()> {
        self.collection(collection).insert_one(document).await?;
        Ok(())
    }

    async fn list_collection_names(&self) -> EngineResult<Vec<String>> {
        let mut names = self.db.list_collection_names().await?;
        names.sort();
        Ok(names)
    }

    async fn list_index_keys(&self, collection: &str) -> EngineResult<Vec<Document>> {
        let indexes: Vec<IndexModel> = self
            .collection(collection)
            .list_indexes()
            .await?
            .try_collect()
            .await?;
        Ok(indexes.into_iter().map(|index| index.keys).collect())
    }

    async fn find_documents(&self, collection: &str) -> EngineResult<Vec<Document>> {
        let documents: Vec<Document> = self
            .collection(collection)
            .find(doc! {})
            .await?
            .try_collect()
            .await?;
        Ok(documents)
    }

    async fn authenticated_roles(&self) -> EngineResult<Vec<RoleGrant>> {
        let reply = self.db.run_command(doc! { "connectionStatus": 1 }).await?;
        let status: ConnectionStatus = from_document(reply).map_err(EngineError::decode)?;
        Ok(status.auth_info.authenticated_user_roles)
    }
}
