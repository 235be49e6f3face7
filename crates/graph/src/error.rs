use thiserror::Error;

use crate::state::ConnectionState;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    /// The store is not accepting writes; nothing was sent.
    #[error("Graph store unavailable ({state})")]
    Unavailable { state: ConnectionState },

    #[error("Graph connection failed: {0}")]
    Connection(String),

    /// A statement or transaction failed after reaching the store.
    #[error("Graph write failed: {0}")]
    Write(String),

    #[error("Invalid graph configuration: {0}")]
    Config(String),
}

impl From<neo4rs::Error> for GraphError {
    fn from(e: neo4rs::Error) -> Self {
        GraphError::Write(e.to_string())
    }
}
