//! Uploaded content storage.
//!
//! Read nodes normally pull from the filesystem, but a host can attach
//! in-memory table content to a node id (uploads, pasted data, test
//! fixtures). The store is consulted before the node's configured path.

use crate::engine::frame::{DataFrame, FrameRef};
use crate::flow::id::NodeId;
use std::collections::HashMap;
use std::sync::Arc;

/// Keyed frame storage a flow consults when resolving read nodes.
pub trait ContentStore {
    fn get(&self, id: NodeId) -> Option<FrameRef>;
    fn set(&mut self, id: NodeId, frame: DataFrame);
    fn delete(&mut self, id: NodeId);
}

/// Plain in-process store.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    frames: HashMap<NodeId, FrameRef>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl ContentStore for InMemoryContentStore {
    fn get(&self, id: NodeId) -> Option<FrameRef> {
        self.frames.get(&id).cloned()
    }

    fn set(&mut self, id: NodeId, frame: DataFrame) {
        self.frames.insert(id, Arc::new(frame));
    }

    fn delete(&mut self, id: NodeId) {
        self.frames.remove(&id);
    }
}
