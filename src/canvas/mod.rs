//! Host capability surface: the parts of a canvas editor this crate drives.
//!
//! A host implements [`Workspace`], [`Canvas`] and [`CanvasNode`]; node types
//! share one [`NodeType`] whose menu handler is the slot the interceptor
//! wraps. [`memory`] provides a complete in-process host.

pub mod events;
pub mod memory;
pub mod menu;

use std::fmt;
use std::sync::{Arc, RwLock};

pub use events::{
    EventBus, EventHandler, EventRef, WorkspaceEvent, ACTIVE_LEAF_CHANGE_EVENT, CANVAS_MENU_EVENT,
};
pub use menu::{Menu, MenuAction, MenuItem};

use crate::config::ColorToken;

/// Position and size of a node on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NodeGeometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NodeGeometry {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// The workspace the plugin is loaded into
pub trait Workspace: Send + Sync {
    /// The canvas in the active view, if the active view is a canvas
    fn active_canvas(&self) -> Option<Arc<dyn Canvas>>;

    fn events(&self) -> &EventBus;
}

pub trait Canvas: Send + Sync {
    fn nodes(&self) -> Vec<Arc<dyn CanvasNode>>;

    fn create_text_node(&self, geometry: NodeGeometry) -> Arc<dyn CanvasNode>;

    /// Ask the host to persist the canvas
    fn request_save(&self);
}

pub trait CanvasNode: Send + Sync {
    fn id(&self) -> &str;

    fn text(&self) -> String;

    fn geometry(&self) -> NodeGeometry;

    fn set_text(&self, text: &str);

    fn set_color(&self, color: &ColorToken);

    /// `None` once the node has been detached from its canvas
    fn canvas(&self) -> Option<Arc<dyn Canvas>>;

    /// Behavior shared by every node of this node's type
    fn node_type(&self) -> Arc<NodeType>;
}

/// Context-menu handler shared by all nodes of one type
pub type MenuHandler = Arc<dyn Fn(&Arc<dyn CanvasNode>, &Menu) + Send + Sync>;

/// Shared per-type behavior. The menu handler is replaceable so that
/// behavior can be layered over the host's own without a dedicated hook.
pub struct NodeType {
    name: String,
    menu_handler: RwLock<MenuHandler>,
}

impl NodeType {
    pub fn new(name: impl Into<String>, menu_handler: MenuHandler) -> Self {
        Self {
            name: name.into(),
            menu_handler: RwLock::new(menu_handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Populate `menu` for a right-click on `node`
    pub fn show_menu(&self, node: &Arc<dyn CanvasNode>, menu: &Menu) {
        // Clone out of the lock so the handler may itself swap handlers
        let handler = self.menu_handler();
        handler(node, menu);
    }

    pub fn menu_handler(&self) -> MenuHandler {
        self.menu_handler
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Swap in a new handler, returning the previous one
    pub fn replace_menu_handler(&self, handler: MenuHandler) -> MenuHandler {
        let mut slot = self.menu_handler.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *slot, handler)
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType").field("name", &self.name).finish()
    }
}
