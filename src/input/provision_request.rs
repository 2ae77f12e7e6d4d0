use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_ENDPOINT: &str = "mongodb://localhost:27017";

/// Characters MongoDB refuses in database names.
const FORBIDDEN_DATABASE_CHARS: &[char] = &['/', '\\', '.', ' ', '"', '$'];

/// Where and as whom to connect. Read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfiguration {
    pub endpoint: String,
    // optional components of this configuration
    pub username: Option<String>,
    pub password: Option<String>,
    pub authentication_database: String,
    pub tls_cert: Option<String>,
}

impl Default for DatabaseConfiguration {
    fn default() -> DatabaseConfiguration {
        DatabaseConfiguration {
            endpoint: DEFAULT_ENDPOINT.into(),
            username: Some("root".into()),
            password: Some("password".into()),
            authentication_database: "admin".into(),
            tls_cert: None,
        }
    }
}

impl DatabaseConfiguration {
    /// Same endpoint and TLS settings, different credential.
    pub fn with_credentials(&self, username: &str, password: &str, auth_db: &str) -> Self {
        DatabaseConfiguration {
            endpoint: self.endpoint.clone(),
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            authentication_database: auth_db.to_string(),
            tls_cert: self.tls_cert.clone(),
        }
    }

    pub fn use_tls(&self) -> bool {
        self.tls_cert.is_some()
            || self.endpoint.contains("tls=true")
            || self.endpoint.contains("ssl=true")
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminUser {
    pub username: String,
    pub password: String,
    pub roles: Vec<String>,
}

impl fmt::Debug for AdminUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminUser")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("roles", &self.roles)
            .finish()
    }
}

impl Default for AdminUser {
    fn default() -> Self {
        AdminUser {
            username: "testadmin".into(),
            password: "password".into(),
            roles: vec!["readWrite".into(), "dbAdmin".into()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum IndexDirection {
    Ascending,
    Descending,
}

impl IndexDirection {
    pub fn as_i32(self) -> i32 {
        match self {
            IndexDirection::Ascending => 1,
            IndexDirection::Descending => -1,
        }
    }
}

impl TryFrom<i32> for IndexDirection {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(IndexDirection::Ascending),
            -1 => Ok(IndexDirection::Descending),
            other => Err(format!(
                "index direction must be 1 or -1, got {}",
                other
            )),
        }
    }
}

impl From<IndexDirection> for i32 {
    fn from(direction: IndexDirection) -> i32 {
        direction.as_i32()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescription {
    pub field: String,
    pub direction: IndexDirection,
}

impl IndexDescription {
    pub fn ascending(field: &str) -> Self {
        IndexDescription {
            field: field.to_string(),
            direction: IndexDirection::Ascending,
        }
    }

    /// Key document as the engine expects it, e.g. `{ uid: 1 }`.
    pub fn keys(&self) -> Document {
        let mut keys = Document::new();
        keys.insert(self.field.clone(), self.direction.as_i32());
        keys
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionDescription {
    pub name: String,
    pub indexes: Vec<IndexDescription>,
    pub seed_documents: Vec<Document>,
}

impl Default for CollectionDescription {
    fn default() -> Self {
        CollectionDescription {
            name: "test".into(),
            indexes: vec![IndexDescription::ascending("uid")],
            seed_documents: vec![doc! { "comment": "This is a test document" }],
        }
    }
}

/// Everything the provisioner sets up on the target database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionRequest {
    pub database: String,
    pub user: AdminUser,
    pub collection: CollectionDescription,
}

impl Default for ProvisionRequest {
    fn default() -> Self {
        ProvisionRequest {
            database: "test-server".into(),
            user: AdminUser::default(),
            collection: CollectionDescription::default(),
        }
    }
}

impl ProvisionRequest {
    /// Checks names before anything is sent to the engine.
    pub fn validate(&self) -> Result<(), String> {
        if self.database.is_empty() {
            return Err("database name is empty".into());
        }
        if let Some(c) = self
            .database
            .chars()
            .find(|c| FORBIDDEN_DATABASE_CHARS.contains(c))
        {
            return Err(format!(
                "database name {:?} contains forbidden character {:?}",
                self.database, c
            ));
        }
        if self.user.username.is_empty() {
            return Err("user name is empty".into());
        }
        if self.collection.name.is_empty() {
            return Err("collection name is empty".into());
        }
        if self.collection.name.starts_with("system.") {
            return Err(format!(
                "collection name {:?} is in the reserved system namespace",
                self.collection.name
            ));
        }
        if let Some(index) = self.collection.indexes.iter().find(|i| i.field.is_empty()) {
            return Err(format!("index with direction {} has no field", index.direction.as_i32()));
        }
        Ok(())
    }
}
