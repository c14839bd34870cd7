//! Assembles complete [`Value`] trees from a balanced run of parse events.
//!
//! The classifier feeds an [`ObjectBuilder`] every event between a
//! container's start and its matching end. Only each event's `slot` (the
//! verbatim member key) matters here; nesting is tracked by the builder's own
//! stack, so the same builder works at any depth of the document.

use crate::{
    event::ParseEvent,
    value::{Array, Map, Value},
};

#[derive(Debug)]
enum Node {
    Map { slot: Option<String>, map: Map },
    Array { slot: Option<String>, items: Array },
}

/// Incremental builder for one JSON subtree.
///
/// Feed it the events of a balanced container (starting with `StartMap` or
/// `StartArray`); once the matching close has been fed, [`take`] yields the
/// finished value.
///
/// [`take`]: ObjectBuilder::take
#[derive(Debug, Default)]
pub struct ObjectBuilder {
    stack: Vec<Node>,
    finished: Option<Value>,
}

impl ObjectBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot a new child occupies in the node below it: the event's
    /// verbatim key when the parent is a map, nothing when it is an array
    /// (or the root).
    fn child_slot(&self, slot: Option<&String>) -> Option<String> {
        match self.stack.last() {
            Some(Node::Map { .. }) => Some(slot.cloned().unwrap_or_default()),
            _ => None,
        }
    }

    fn attach(&mut self, slot: Option<String>, value: Value) {
        match self.stack.last_mut() {
            Some(Node::Map { map, .. }) => {
                map.insert(slot.unwrap_or_default(), value);
            }
            Some(Node::Array { items, .. }) => items.push(value),
            None => self.finished = Some(value),
        }
    }

    pub fn feed(&mut self, event: &ParseEvent) {
        match event {
            ParseEvent::StartMap { slot, .. } => {
                let slot = self.child_slot(slot.as_ref());
                self.stack.push(Node::Map {
                    slot,
                    map: Map::new(),
                });
            }
            ParseEvent::StartArray { slot, .. } => {
                let slot = self.child_slot(slot.as_ref());
                self.stack.push(Node::Array {
                    slot,
                    items: Array::new(),
                });
            }
            ParseEvent::Scalar { slot, value, .. } => {
                let slot = self.child_slot(slot.as_ref());
                self.attach(slot, value.clone().into());
            }
            ParseEvent::EndMap { .. } | ParseEvent::EndArray { .. } => {
                debug_assert!(!self.stack.is_empty(), "close without matching open");
                if let Some(node) = self.stack.pop() {
                    let (slot, value) = match node {
                        Node::Map { slot, map } => (slot, Value::Object(map)),
                        Node::Array { slot, items } => (slot, Value::Array(items)),
                    };
                    self.attach(slot, value);
                }
            }
        }
    }

    /// True once the container fed first has been closed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.finished.is_some()
    }

    /// The finished value, if the subtree is complete.
    pub fn take(&mut self) -> Option<Value> {
        self.finished.take()
    }
}
