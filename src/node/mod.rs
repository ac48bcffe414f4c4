//! Response nodes: the canvas node a generation writes into.

pub mod spinner;

use std::sync::Arc;

use crate::canvas::{CanvasNode, NodeGeometry};
use crate::config::ColorToken;
use crate::error::{PluginError, Result};

pub use spinner::ProgressIndicator;

/// Vertical space between a source node and its response
pub const RESPONSE_NODE_GAP: f64 = 32.0;

pub const PLACEHOLDER_TEXT: &str = "Prompting...";

/// Geometry of the response node placed directly under `source`
pub fn geometry_below(source: NodeGeometry) -> NodeGeometry {
    NodeGeometry {
        x: source.x,
        y: source.y + source.height + RESPONSE_NODE_GAP,
        width: source.width,
        height: source.height,
    }
}

/// A node created for one generation. Owned by that generation's task.
pub struct ResponseNode {
    node: Arc<dyn CanvasNode>,
    accumulated: String,
}

impl ResponseNode {
    /// Create the placeholder node under `source` and ask the host to save
    pub fn create(source: &dyn CanvasNode) -> Result<Self> {
        let canvas = source.canvas().ok_or_else(|| {
            PluginError::Runtime(format!("node {} is not attached to a canvas", source.id()))
        })?;

        let node = canvas.create_text_node(geometry_below(source.geometry()));
        node.set_text(PLACEHOLDER_TEXT);
        canvas.request_save();

        tracing::debug!(source = source.id(), response = node.id(), "Created response node");

        Ok(Self {
            node,
            accumulated: String::new(),
        })
    }

    /// Append a streamed fragment and show everything received so far
    pub fn append(&mut self, fragment: &str) {
        self.accumulated.push_str(fragment);
        self.node.set_text(&self.accumulated);
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn set_text(&self, text: &str) {
        self.node.set_text(text);
    }

    pub fn set_color(&self, color: &ColorToken) {
        self.node.set_color(color);
    }

    pub fn id(&self) -> &str {
        self.node.id()
    }

    pub fn handle(&self) -> Arc<dyn CanvasNode> {
        self.node.clone()
    }
}
