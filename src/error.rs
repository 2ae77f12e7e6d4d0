use crate::engine::EngineError;
use std::fmt;
use thiserror::Error;

/// The fixed steps of a provisioning run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    Connect,
    DropDatabase,
    DropUser,
    CreateUser,
    CreateCollection,
    CreateIndex,
    InsertDocument,
    /// Reading state back after a run; not part of the sequence.
    Inspect,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisionStep::Connect => "connect",
            ProvisionStep::DropDatabase => "drop database",
            ProvisionStep::DropUser => "drop user",
            ProvisionStep::CreateUser => "create user",
            ProvisionStep::CreateCollection => "create collection",
            ProvisionStep::CreateIndex => "create index",
            ProvisionStep::InsertDocument => "insert document",
            ProvisionStep::Inspect => "inspect",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid provision request: {0}")]
    InvalidRequest(String),

    #[error("could not load provision request: {0}")]
    Request(String),

    #[error("cannot reach or authenticate with the database engine: {source}")]
    Connection {
        step: ProvisionStep,
        #[source]
        source: EngineError,
    },

    #[error("step `{step}` failed: {source}")]
    Database {
        step: ProvisionStep,
        #[source]
        source: EngineError,
    },

    #[error("step `{step}` failed: {source}")]
    UserCreation {
        step: ProvisionStep,
        #[source]
        source: EngineError,
    },

    #[error("step `{step}` failed: {source}")]
    Collection {
        step: ProvisionStep,
        #[source]
        source: EngineError,
    },

    #[error("step `{step}` failed: {source}")]
    Insert {
        step: ProvisionStep,
        #[source]
        source: EngineError,
    },

    #[error("could not read back the database: {source}")]
    Inspect {
        step: ProvisionStep,
        #[source]
        source: EngineError,
    },
}

impl ProvisionError {
    /// Wraps an engine failure in the error kind owned by `step`.
    pub fn at(step: ProvisionStep, source: EngineError) -> Self {
        match step {
            ProvisionStep::Connect => ProvisionError::Connection { step, source },
            ProvisionStep::DropDatabase => ProvisionError::Database { step, source },
            ProvisionStep::DropUser | ProvisionStep::CreateUser => {
                ProvisionError::UserCreation { step, source }
            }
            ProvisionStep::CreateCollection | ProvisionStep::CreateIndex => {
                ProvisionError::Collection { step, source }
            }
            ProvisionStep::InsertDocument => ProvisionError::Insert { step, source },
            ProvisionStep::Inspect => ProvisionError::Inspect { step, source },
        }
    }

    /// The step that failed, if the run got as far as the engine.
    pub fn step(&self) -> Option<ProvisionStep> {
        match self {
            ProvisionError::InvalidRequest(_) | ProvisionError::Request(_) => None,
            ProvisionError::Connection { step, .. }
            | ProvisionError::Database { step, .. }
            | ProvisionError::UserCreation { step, .. }
            | ProvisionError::Collection { step, .. }
            | ProvisionError::Insert { step, .. }
            | ProvisionError::Inspect { step, .. } => Some(*step),
        }
    }

    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            ProvisionError::InvalidRequest(_) | ProvisionError::Request(_) => None,
            ProvisionError::Connection { source, .. }
            | ProvisionError::Database { source, .. }
            | ProvisionError::UserCreation { source, .. }
            | ProvisionError::Collection { source, .. }
            | ProvisionError::Insert { source, .. }
            | ProvisionError::Inspect { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::codes;

    #[test]
    fn steps_map_to_error_kinds() {
        let source = EngineError::other("nope");
        assert!(matches!(
            ProvisionError::at(ProvisionStep::Connect, source.clone()),
            ProvisionError::Connection { .. }
        ));
        assert!(matches!(
            ProvisionError::at(ProvisionStep::DropDatabase, source.clone()),
            ProvisionError::Database { .. }
        ));
        assert!(matches!(
            ProvisionError::at(ProvisionStep::DropUser, source.clone()),
            ProvisionError::UserCreation { .. }
        ));
        assert!(matches!(
            ProvisionError::at(ProvisionStep::CreateIndex, source.clone()),
            ProvisionError::Collection { .. }
        ));
        assert!(matches!(
            ProvisionError::at(ProvisionStep::InsertDocument, source.clone()),
            ProvisionError::Insert { .. }
        ));
        assert!(matches!(
            ProvisionError::at(ProvisionStep::Inspect, source),
            ProvisionError::Inspect { .. }
        ));
    }

    #[test]
    fn message_names_the_failed_step() {
        let err = ProvisionError::at(
            ProvisionStep::CreateCollection,
            EngineError::new(codes::NAMESPACE_EXISTS, "NamespaceExists", "Collection test-server.test already exists."),
        );
        assert_eq!(
            err.to_string(),
            "step `create collection` failed: Collection test-server.test already exists. (error code 48, NamespaceExists)"
        );
        assert_eq!(err.step(), Some(ProvisionStep::CreateCollection));
        assert_eq!(err.engine_error().and_then(|e| e.code), Some(48));
    }
}
