//! # FlowFrame: dataflow execution engine for tabular pipelines
//!
//! FlowFrame executes directed acyclic graphs of typed table operations:
//! read CSV data or literal rows, transform them through filter, select,
//! group-by, join, sort, pivot/unpivot, dedup, and scripted nodes, and
//! write or preview the results.
//!
//! ## Architecture
//!
//! - **Engine** (`engine`): columnar frames, lazy query plans with
//!   structural schemas and stable identity hashes, the evaluator, and the
//!   Rhai scripting bridge
//! - **Flow** (`flow`): the node graph, pure schema inference, the plan
//!   registry with its LRU preview cache, the run driver, and YAML/JSON
//!   document serialization
//!
//! ## Example
//!
//! ```
//! use flowframe::engine::frame::DataFrame;
//! use flowframe::flow::{FlowRunner, InputSlot, NodeId, NodeKind};
//!
//! let mut runner = FlowRunner::default();
//! runner.add_node_of_kind(NodeId(1), NodeKind::Read).unwrap();
//! runner.attach_content(
//!     NodeId(1),
//!     DataFrame::from_csv_str("a,b\n1,x\n2,y\n").unwrap(),
//! );
//! runner.add_node_of_kind(NodeId(2), NodeKind::Head).unwrap();
//! runner.add_edge(NodeId(1), NodeId(2), InputSlot::Default).unwrap();
//!
//! let report = runner.run().unwrap();
//! assert_eq!(report.failed, 0);
//! let preview = runner.fetch_preview(NodeId(2), 100, false).unwrap();
//! assert_eq!(preview.total_rows, 2);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod flow;
pub mod types;

pub use config::{ExecutionLocation, ExecutionMode, FlowSettings};
pub use error::{FlowError, Result};
pub use types::{ColumnDef, DataType, Schema, Value};
