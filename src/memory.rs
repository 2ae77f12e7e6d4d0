//! An in-process engine with just enough server behavior to run and verify
//! a provisioning sequence without a network: users outlive their database,
//! collection names are unique, indexes on the same keys are deduplicated and
//! inserts assign an `_id`. Used by `--dry-run` and by the test suites.
//!
//! A user may only touch the database it was created in, and only with the
//! built-in roles that allow the call. Custom roles and
//! privilege inheritance are not modelled.
//!
//! It is stricter than a real server in one place: it refuses to create a
//! user with an empty role list.

use crate::engine::{codes, Connector, Engine, EngineError, EngineResult, RoleGrant};
use crate::input::provision_request::{AdminUser, DatabaseConfiguration};
use async_trait::async_trait;
use log::debug;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, Document};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

const BUILTIN_ROLES: &[&str] = &[
    "read",
    "readWrite",
    "dbAdmin",
    "dbOwner",
    "userAdmin",
    "clusterAdmin",
    "readAnyDatabase",
    "readWriteAnyDatabase",
    "userAdminAnyDatabase",
    "dbAdminAnyDatabase",
    "root",
];

const ADMIN_DATABASE: &str = "admin";

/// Engine calls, as recorded in the journal and targeted by failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    DropDatabase,
    UserExists,
    DropUser,
    CreateUser,
    CreateCollection,
    CreateIndex,
    InsertDocument,
}

/// What a call does to the selected database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    ListMetadata,
    ReadDocuments,
    WriteDocuments,
    CreateNamespace,
    DropDatabase,
    ManageUsers,
}

impl Action {
    /// Built-in roles on the same database that permit the action.
    fn allowed_roles(self) -> &'static [&'static str] {
        match self {
            Action::ListMetadata => &["read", "readWrite", "dbAdmin", "dbOwner"],
            Action::ReadDocuments => &["read", "readWrite", "dbOwner"],
            Action::WriteDocuments => &["readWrite", "dbOwner"],
            Action::CreateNamespace => &["readWrite", "dbAdmin", "dbOwner"],
            Action::DropDatabase => &["dbAdmin", "dbOwner"],
            Action::ManageUsers => &["userAdmin", "dbOwner"],
        }
    }
}

#[derive(Debug, Clone)]
struct StoredUser {
    password: String,
    roles: Vec<String>,
}

#[derive(Debug, Clone)]
struct StoredCollection {
    indexes: Vec<(String, Document)>,
    documents: Vec<Document>,
}

impl StoredCollection {
    fn new() -> Self {
        StoredCollection {
            indexes: vec![("_id_".to_string(), doc! { "_id": 1 })],
            documents: vec![],
        }
    }
}

#[derive(Debug, Default)]
struct ServerState {
    databases: BTreeMap<String, BTreeMap<String, StoredCollection>>,
    // keyed by (database, username); dropping a database leaves them alone
    users: BTreeMap<(String, String), StoredUser>,
    failures: HashMap<Operation, EngineError>,
    journal: Vec<Operation>,
}

impl ServerState {
    fn record(&mut self, op: Operation) -> EngineResult<()> {
        self.journal.push(op);
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn collections(&mut self, database: &str) -> &mut BTreeMap<String, StoredCollection> {
        self.databases.entry(database.to_string()).or_default()
    }

    fn collection(&mut self, database: &str, name: &str) -> &mut StoredCollection {
        self.collections(database)
            .entry(name.to_string())
            .or_insert_with(StoredCollection::new)
    }
}

fn lock(state: &Mutex<ServerState>) -> EngineResult<MutexGuard<'_, ServerState>> {
    state
        .lock()
        .map_err(|_| EngineError::other("in-memory server state is poisoned"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Identity {
    Anonymous,
    Root,
    User { database: String, username: String },
}

/// Shared handle to one in-memory server. Clones see the same state, so a
/// test can keep one to inspect what a provisioner did with another.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    state: Arc<Mutex<ServerState>>,
    root_username: String,
    root_password: String,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        MemoryConnector::new("root", "password")
    }
}

impl MemoryConnector {
    pub fn new(root_username: &str, root_password: &str) -> Self {
        MemoryConnector {
            state: Arc::new(Mutex::new(ServerState::default())),
            root_username: root_username.to_string(),
            root_password: root_password.to_string(),
        }
    }

    /// Every later call of `op` fails with `error`.
    pub fn fail_on(&self, op: Operation, error: EngineError) {
        if let Ok(mut state) = lock(&self.state) {
            state.failures.insert(op, error);
        }
    }

    /// Engine calls made so far, in order.
    pub fn journal(&self) -> Vec<Operation> {
        lock(&self.state)
            .map(|state| state.journal.clone())
            .unwrap_or_default()
    }

    pub fn has_user(&self, database: &str, username: &str) -> bool {
        lock(&self.state)
            .map(|state| {
                state
                    .users
                    .contains_key(&(database.to_string(), username.to_string()))
            })
            .unwrap_or(false)
    }

    /// Puts leftover data into `database`, as if from an earlier run.
    pub fn seed_collection(&self, database: &str, collection: &str, documents: Vec<Document>) {
        if let Ok(mut state) = lock(&self.state) {
            state.collection(database, collection).documents.extend(documents);
        }
    }

    fn authenticate(
        &self,
        state: &ServerState,
        db_config: &DatabaseConfiguration,
    ) -> EngineResult<Identity> {
        let username = match &db_config.username {
            Some(username) => username,
            None => return Ok(Identity::Anonymous),
        };
        let password = db_config.password.as_deref().unwrap_or_default();
        let auth_db = db_config.authentication_database.as_str();

        if auth_db == ADMIN_DATABASE
            && *username == self.root_username
            && password == self.root_password
        {
            return Ok(Identity::Root);
        }
        match state.users.get(&(auth_db.to_string(), username.clone())) {
            Some(user) if user.password == password => Ok(Identity::User {
                database: auth_db.to_string(),
                username: username.clone(),
            }),
            _ => Err(EngineError::new(
                codes::AUTHENTICATION_FAILED,
                "AuthenticationFailed",
                "Authentication failed.",
            )),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Engine = MemoryEngine;

    async fn connect(
        &self,
        db_config: &DatabaseConfiguration,
        database: &str,
    ) -> EngineResult<MemoryEngine> {
        let identity = {
            let mut state = lock(&self.state)?;
            state.record(Operation::Connect)?;
            self.authenticate(&state, db_config)?
        };
        debug!("In-memory engine connected as {:?}", identity);
        Ok(MemoryEngine {
            state: self.state.clone(),
            database: database.to_string(),
            identity,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MemoryEngine {
    state: Arc<Mutex<ServerState>>,
    database: String,
    identity: Identity,
}

impl MemoryEngine {
    /// Runs `f` on the server state after checking the caller may perform
    /// `action` on the selected database.
    fn with_state<T>(
        &self,
        op: Option<Operation>,
        action: Action,
        f: impl FnOnce(&mut ServerState) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut state = lock(&self.state)?;
        if let Some(op) = op {
            state.record(op)?;
        }
        if let Identity::User { database, username } = &self.identity {
            let permitted = *database == self.database
                && state
                    .users
                    .get(&(database.clone(), username.clone()))
                    .map(|user| {
                        user.roles
                            .iter()
                            .any(|role| action.allowed_roles().contains(&role.as_str()))
                    })
                    .unwrap_or(false);
            if !permitted {
                return Err(EngineError::new(
                    codes::UNAUTHORIZED,
                    "Unauthorized",
                    format!(
                        "not authorized on {} to execute command as {}@{}",
                        self.database, username, database
                    ),
                ));
            }
        }
        f(&mut state)
    }

    fn user_key(&self, username: &str) -> (String, String) {
        (self.database.clone(), username.to_string())
    }
}

fn index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, direction)| match direction {
            Bson::Int32(i) => format!("{}_{}", field, i),
            Bson::Int64(i) => format!("{}_{}", field, i),
            Bson::Double(d) => format!("{}_{}", field, *d as i64),
            other => format!("{}_{}", field, other),
        })
        .collect::<Vec<String>>()
        .join("_")
}

#[async_trait]
impl Engine for MemoryEngine {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn drop_database(&self) -> EngineResult<()> {
        self.with_state(Some(Operation::DropDatabase), Action::DropDatabase, |state| {
            state.databases.remove(&self.database);
            Ok(())
        })
    }

    async fn user_exists(&self, username: &str) -> EngineResult<bool> {
        self.with_state(Some(Operation::UserExists), Action::ManageUsers, |state| {
            Ok(state.users.contains_key(&self.user_key(username)))
        })
    }

    async fn drop_user(&self, username: &str) -> EngineResult<()> {
        self.with_state(Some(Operation::DropUser), Action::ManageUsers, |state| {
            match state.users.remove(&self.user_key(username)) {
                Some(_) => Ok(()),
                None => Err(EngineError::new(
                    codes::USER_NOT_FOUND,
                    "UserNotFound",
                    format!("User '{}@{}' not found", username, self.database),
                )),
            }
        })
    }

    async fn create_user(&self, user: &AdminUser) -> EngineResult<()> {
        self.with_state(Some(Operation::CreateUser), Action::ManageUsers, |state| {
            if user.roles.is_empty() {
                return Err(EngineError::new(
                    codes::BAD_VALUE,
                    "BadValue",
                    format!(
                        "User {}@{} must be granted at least one role",
                        user.username, self.database
                    ),
                ));
            }
            if let Some(role) = user.roles.iter().find(|r| !BUILTIN_ROLES.contains(&r.as_str())) {
                return Err(EngineError::new(
                    codes::ROLE_NOT_FOUND,
                    "RoleNotFound",
                    format!("Could not find role: {}@{}", role, self.database),
                ));
            }
            let key = self.user_key(&user.username);
            if state.users.contains_key(&key) {
                return Err(EngineError::new(
                    codes::DUPLICATE_USER,
                    "Location51003",
                    format!("User \"{}@{}\" already exists", user.username, self.database),
                ));
            }
            state.users.insert(
                key,
                StoredUser {
                    password: user.password.clone(),
                    roles: user.roles.clone(),
                },
            );
            Ok(())
        })
    }

    async fn create_collection(&self, name: &str) -> EngineResult<()> {
        self.with_state(Some(Operation::CreateCollection), Action::CreateNamespace, |state| {
            let collections = state.collections(&self.database);
            if collections.contains_key(name) {
                return Err(EngineError::new(
                    codes::NAMESPACE_EXISTS,
                    "NamespaceExists",
                    format!("Collection {}.{} already exists.", self.database, name),
                ));
            }
            collections.insert(name.to_string(), StoredCollection::new());
            Ok(())
        })
    }

    async fn create_index(&self, collection: &str, keys: Document) -> EngineResult<String> {
        self.with_state(Some(Operation::CreateIndex), Action::CreateNamespace, |state| {
            if keys.is_empty() {
                return Err(EngineError::new(
                    codes::BAD_VALUE,
                    "BadValue",
                    "Index keys cannot be an empty object.",
                ));
            }
            let stored = state.collection(&self.database, collection);
            if let Some((name, _)) = stored.indexes.iter().find(|(_, k)| *k == keys) {
                return Ok(name.clone());
            }
            let name = index_name(&keys);
            stored.indexes.push((name.clone(), keys));
            Ok(name)
        })
    }

    async fn insert_document(&self, collection: &str, mut document: Document) -> EngineResult<()> {
        self.with_state(Some(Operation::InsertDocument), Action::WriteDocuments, |state| {
            if let Some(field) = document.keys().find(|k| k.starts_with('$')) {
                return Err(EngineError::new(
                    codes::BAD_VALUE,
                    "BadValue",
                    format!("Document can't have $ prefixed field names: {}", field),
                ));
            }
            if !document.contains_key("_id") {
                document.insert("_id", ObjectId::new());
            }
            let stored = state.collection(&self.database, collection);
            let id = document.get("_id").cloned();
            if stored.documents.iter().any(|d| d.get("_id").cloned() == id) {
                return Err(EngineError::new(
                    codes::DUPLICATE_KEY,
                    "DuplicateKey",
                    format!(
                        "E11000 duplicate key error collection: {}.{}",
                        self.database, collection
                    ),
                ));
            }
            stored.documents.push(document);
            Ok(())
        })
    }

    async fn list_collection_names(&self) -> EngineResult<Vec<String>> {
        self.with_state(None, Action::ListMetadata, |state| {
            Ok(state
                .databases
                .get(&self.database)
                .map(|collections| collections.keys().cloned().collect())
                .unwrap_or_default())
        })
    }

    async fn list_index_keys(&self, collection: &str) -> EngineResult<Vec<Document>> {
        self.with_state(None, Action::ListMetadata, |state| {
            match state
                .databases
                .get(&self.database)
                .and_then(|collections| collections.get(collection))
            {
                Some(stored) => Ok(stored.indexes.iter().map(|(_, keys)| keys.clone()).collect()),
                None => Err(EngineError::new(
                    codes::NAMESPACE_NOT_FOUND,
                    "NamespaceNotFound",
                    format!("ns does not exist: {}.{}", self.database, collection),
                )),
            }
        })
    }

    async fn find_documents(&self, collection: &str) -> EngineResult<Vec<Document>> {
        self.with_state(None, Action::ReadDocuments, |state| {
            Ok(state
                .databases
                .get(&self.database)
                .and_then(|collections| collections.get(collection))
                .map(|stored| stored.documents.clone())
                .unwrap_or_default())
        })
    }

    async fn authenticated_roles(&self) -> EngineResult<Vec<RoleGrant>> {
        let state = lock(&self.state)?;
        Ok(match &self.identity {
            Identity::Anonymous => vec![],
            Identity::Root => vec![RoleGrant::new("root", ADMIN_DATABASE)],
            Identity::User { database, username } => state
                .users
                .get(&(database.clone(), username.clone()))
                .map(|user| user.roles.iter().map(|role| RoleGrant::new(role, database)).collect())
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn root_engine(connector: &MemoryConnector, database: &str) -> MemoryEngine {
        connector
            .connect(&DatabaseConfiguration::default(), database)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn users_survive_drop_database() {
        let connector = MemoryConnector::default();
        let engine = root_engine(&connector, "test-server").await;
        engine.create_user(&AdminUser::default()).await.unwrap();
        engine.create_collection("test").await.unwrap();

        engine.drop_database().await.unwrap();

        assert!(engine.list_collection_names().await.unwrap().is_empty());
        assert!(engine.user_exists("testadmin").await.unwrap());
    }

    #[tokio::test]
    async fn drop_missing_user_is_user_not_found() {
        let connector = MemoryConnector::default();
        let engine = root_engine(&connector, "test-server").await;
        let err = engine.drop_user("nobody").await.unwrap_err();
        assert!(err.is_user_not_found());
    }

    #[tokio::test]
    async fn create_index_is_deduplicated_and_named() {
        let connector = MemoryConnector::default();
        let engine = root_engine(&connector, "db").await;
        engine.create_collection("c").await.unwrap();
        assert_eq!(engine.create_index("c", doc! { "uid": 1 }).await.unwrap(), "uid_1");
        assert_eq!(engine.create_index("c", doc! { "uid": 1 }).await.unwrap(), "uid_1");
        assert_eq!(
            engine.create_index("c", doc! { "a": 1, "b": -1 }).await.unwrap(),
            "a_1_b_-1"
        );
        assert_eq!(engine.list_index_keys("c").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rejects_wrong_password_and_unknown_roles() {
        let connector = MemoryConnector::default();
        let bad = DatabaseConfiguration::default().with_credentials("root", "wrong", "admin");
        let err = connector.connect(&bad, "db").await.unwrap_err();
        assert_eq!(err.code, Some(codes::AUTHENTICATION_FAILED));

        let engine = root_engine(&connector, "db").await;
        let user = AdminUser {
            roles: vec!["superuser".into()],
            ..AdminUser::default()
        };
        let err = engine.create_user(&user).await.unwrap_err();
        assert_eq!(err.code, Some(codes::ROLE_NOT_FOUND));
    }

    #[tokio::test]
    async fn insert_assigns_id_and_rejects_operators() {
        let connector = MemoryConnector::default();
        let engine = root_engine(&connector, "db").await;
        engine.insert_document("c", doc! { "comment": "x" }).await.unwrap();
        let docs = engine.find_documents("c").await.unwrap();
        assert!(docs[0].get_object_id("_id").is_ok());

        let err = engine
            .insert_document("c", doc! { "$set": { "a": 1 } })
            .await
            .unwrap_err();
        assert_eq!(err.code, Some(codes::BAD_VALUE));
    }

    #[tokio::test]
    async fn provisioned_user_is_confined_to_its_database() {
        let connector = MemoryConnector::default();
        root_engine(&connector, "test-server")
            .await
            .create_user(&AdminUser::default())
            .await
            .unwrap();

        let login = DatabaseConfiguration::default().with_credentials("testadmin", "password", "test-server");
        let own = connector.connect(&login, "test-server").await.unwrap();
        assert!(own.list_collection_names().await.is_ok());

        let other = connector.connect(&login, "admin").await.unwrap();
        let err = other.list_collection_names().await.unwrap_err();
        assert_eq!(err.code, Some(codes::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn read_only_user_cannot_write_or_drop() {
        let connector = MemoryConnector::default();
        let root = root_engine(&connector, "reports").await;
        root.insert_document("daily", doc! { "uid": "0001" }).await.unwrap();
        let reader = AdminUser {
            username: "reader".into(),
            password: "secret".into(),
            roles: vec!["read".into()],
        };
        root.create_user(&reader).await.unwrap();

        let login = DatabaseConfiguration::default().with_credentials("reader", "secret", "reports");
        let engine = connector.connect(&login, "reports").await.unwrap();
        assert_eq!(engine.find_documents("daily").await.unwrap().len(), 1);

        let err = engine
            .insert_document("daily", doc! { "uid": "0002" })
            .await
            .unwrap_err();
        assert_eq!(err.code, Some(codes::UNAUTHORIZED));
        let err = engine.drop_database().await.unwrap_err();
        assert_eq!(err.code, Some(codes::UNAUTHORIZED));
        assert_eq!(root.find_documents("daily").await.unwrap().len(), 1);
    }
}
