//! Flow graph layer: typed nodes, structural operations, inference,
//! document serialization, and the execution driver.

pub mod content;
pub mod document;
pub mod executor;
pub mod executors;
pub mod graph;
pub mod id;
pub mod infer;
pub mod node;
pub mod registry;
pub mod settings;

pub use content::{ContentStore, InMemoryContentStore};
pub use document::{Connection, DocumentNode, FlowDocument, DOCUMENT_VERSION};
pub use executor::{FlowRunner, NodeResult, NodeState, RunReport};
pub use graph::FlowGraph;
pub use id::NodeId;
pub use infer::{infer_schemas, Inferred};
pub use node::{InputSlot, Node};
pub use registry::{CacheConfig, PlanRegistry, Preview};
pub use settings::{NodeKind, NodeSettings};
