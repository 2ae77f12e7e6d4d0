//! The boundary between the provisioner and a database engine.
//!
//! A [`Connector`] authenticates and hands back an [`Engine`] bound to one
//! database. Everything the provisioner or the inspection helpers do goes
//! through these two traits, so the same sequence runs against a live server
//! or the in-process engine in [`crate::memory`].

use crate::input::provision_request::{AdminUser, DatabaseConfiguration};
use async_trait::async_trait;
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server error codes the provisioner reacts to.
pub mod codes {
    pub const BAD_VALUE: i32 = 2;
    pub const AUTHENTICATION_FAILED: i32 = 18;
    pub const USER_NOT_FOUND: i32 = 11;
    pub const UNAUTHORIZED: i32 = 13;
    pub const NAMESPACE_NOT_FOUND: i32 = 26;
    pub const ROLE_NOT_FOUND: i32 = 31;
    pub const NAMESPACE_EXISTS: i32 = 48;
    pub const DUPLICATE_KEY: i32 = 11000;
    pub const DUPLICATE_USER: i32 = 51003;
}

pub type EngineResult<T> = Result<T, EngineError>;

/// An error reported by the engine, or by the driver on its way there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub code: Option<i32>,
    pub code_name: Option<String>,
    pub message: String,
}

impl EngineError {
    pub fn new(code: i32, code_name: &str, message: impl Into<String>) -> Self {
        EngineError {
            code: Some(code),
            code_name: Some(code_name.to_string()),
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        EngineError {
            code: None,
            code_name: None,
            message: message.into(),
        }
    }

    pub fn decode(err: impl fmt::Display) -> Self {
        EngineError::other(format!("Could not parse server reply, error: {}", err))
    }

    pub fn is_user_not_found(&self) -> bool {
        self.code == Some(codes::USER_NOT_FOUND)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.code_name) {
            (Some(code), Some(name)) => {
                write!(f, "{} (error code {}, {})", self.message, code, name)
            }
            (Some(code), None) => write!(f, "{} (error code {})", self.message, code),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for EngineError {}

/// A role held by the authenticated user, scoped to a database.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: String,
    pub db: String,
}

impl RoleGrant {
    pub fn new(role: &str, db: &str) -> Self {
        RoleGrant {
            role: role.to_string(),
            db: db.to_string(),
        }
    }
}

/// Operations on one selected database.
#[async_trait]
pub trait Engine: Send + Sync {
    fn database_name(&self) -> &str;

    async fn drop_database(&self) -> EngineResult<()>;

    async fn user_exists(&self, username: &str) -> EngineResult<bool>;

    /// Fails with [`codes::USER_NOT_FOUND`] when the user is absent.
    async fn drop_user(&self, username: &str) -> EngineResult<()>;

    async fn create_user(&self, user: &AdminUser) -> EngineResult<()>;

    async fn create_collection(&self, name: &str) -> EngineResult<()>;

    /// Returns the name the engine gave the index.
    async fn create_index(&self, collection: &str, keys: Document) -> EngineResult<String>;

    async fn insert_document(&self, collection: &str, document: Document) -> EngineResult<()>;

    async fn list_collection_names(&self) -> EngineResult<Vec<String>>;

    /// Key documents of every index on `collection`, `_id` included.
    async fn list_index_keys(&self, collection: &str) -> EngineResult<Vec<Document>>;

    async fn find_documents(&self, collection: &str) -> EngineResult<Vec<Document>>;

    async fn authenticated_roles(&self) -> EngineResult<Vec<RoleGrant>>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Engine: Engine;

    /// Connects, authenticates and selects `database`.
    async fn connect(
        &self,
        db_config: &DatabaseConfiguration,
        database: &str,
    ) -> EngineResult<Self::Engine>;
}
