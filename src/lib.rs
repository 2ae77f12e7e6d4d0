//! Provisions a MongoDB database into a known state: the database is reset,
//! an administrative user is recreated, and a collection is created with its
//! indexes and seed documents.
//!
//! ```no_run
//! # async fn run() -> Result<(), mongo_provision::ProvisionError> {
//! use mongo_provision::{DatabaseConfiguration, MongoConnector, ProvisionRequest, Provisioner};
//!
//! let provisioner = Provisioner::new(MongoConnector::default());
//! let summary = provisioner
//!     .provision(&DatabaseConfiguration::default(), &ProvisionRequest::default())
//!     .await?;
//! println!("{} ready", summary.database);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod engine;
pub mod error;
pub mod input;
pub mod inspect;
pub mod memory;
pub mod mongo;
pub mod provision;

pub use engine::{Connector, Engine, EngineError, RoleGrant};
pub use error::{ProvisionError, ProvisionStep};
pub use input::provision_request::{
    AdminUser, CollectionDescription, DatabaseConfiguration, IndexDescription, IndexDirection,
    ProvisionRequest,
};
pub use inspect::{inspect, verify_admin_login, ProvisionReport};
pub use memory::MemoryConnector;
pub use mongo::MongoConnector;
pub use provision::{ProvisionSummary, Provisioner};
