//! Graph persistence for fingraph.
//!
//! Every write is an upsert keyed by a natural identifier, so ingesting the
//! same entity twice leaves one node per key and one edge per relationship.
//! Stores track their connection through [`ConnectionTracker`] and refuse
//! writes while disconnected instead of blocking the caller.

pub mod error;
pub mod memory;
pub mod model;
pub mod neo4j;
pub mod schema;
pub mod state;
pub mod store;

pub use error::{GraphError, Result};
pub use memory::{Edge, MemoryGraphStore};
pub use model::{
    price_point_id, rel, AnalysisNode, DocumentNode, EntityNode, NewsItemNode, PricePointNode,
    SectorNode, SegmentNode, SentimentAnalysisNode, TextChunkNode, TranscriptNode,
};
pub use neo4j::{Neo4jGraphStore, Neo4jSettings};
pub use schema::{SchemaItem, SchemaKind, SCHEMA};
pub use state::{ConnectionState, ConnectionTracker, DEFAULT_FAILURE_THRESHOLD};
pub use store::{write_chunked, BatchWriteReport, GraphStore, DEFAULT_CHUNK_SIZE};
