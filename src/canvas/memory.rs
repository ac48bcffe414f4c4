//! In-process canvas host used by the CLI and the test suite

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use super::{
    Canvas, CanvasNode, EventBus, Menu, MenuHandler, MenuItem, NodeGeometry, NodeType, Workspace,
    WorkspaceEvent,
};
use crate::config::ColorToken;

pub const TEXT_NODE_TYPE: &str = "text";

#[derive(Default)]
pub struct MemoryWorkspace {
    events: EventBus,
    active_canvas: RwLock<Option<Arc<MemoryCanvas>>>,
}

impl MemoryWorkspace {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `canvas` the active view and announce the change
    pub fn open_canvas(&self, canvas: Arc<MemoryCanvas>) {
        *self.active_canvas.write().unwrap_or_else(|e| e.into_inner()) = Some(canvas);
        self.events.trigger(&WorkspaceEvent::ActiveLeafChange);
    }

    /// Switch to a non-canvas view
    pub fn close_canvas(&self) {
        *self.active_canvas.write().unwrap_or_else(|e| e.into_inner()) = None;
        self.events.trigger(&WorkspaceEvent::ActiveLeafChange);
    }
}

impl Workspace for MemoryWorkspace {
    fn active_canvas(&self) -> Option<Arc<dyn Canvas>> {
        self.active_canvas
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .map(|canvas| canvas as Arc<dyn Canvas>)
    }

    fn events(&self) -> &EventBus {
        &self.events
    }
}

pub struct MemoryCanvas {
    self_ref: Weak<MemoryCanvas>,
    text_node_type: Arc<NodeType>,
    nodes: RwLock<Vec<Arc<MemoryNode>>>,
    save_requests: AtomicUsize,
}

impl MemoryCanvas {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            text_node_type: Arc::new(NodeType::new(TEXT_NODE_TYPE, default_menu_handler())),
            nodes: RwLock::new(Vec::new()),
            save_requests: AtomicUsize::new(0),
        })
    }

    pub fn add_text_node(&self, text: &str, geometry: NodeGeometry) -> Arc<MemoryNode> {
        let node = Arc::new(MemoryNode {
            id: uuid::Uuid::new_v4().to_string(),
            geometry,
            text: RwLock::new(text.to_string()),
            color: RwLock::new(None),
            text_history: Mutex::new(Vec::new()),
            canvas: self.self_ref.clone(),
            node_type: self.text_node_type.clone(),
        });
        self.nodes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(node.clone());
        node
    }

    pub fn text_node_type(&self) -> Arc<NodeType> {
        self.text_node_type.clone()
    }

    pub fn memory_nodes(&self) -> Vec<Arc<MemoryNode>> {
        self.nodes.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn node(&self, id: &str) -> Option<Arc<MemoryNode>> {
        self.memory_nodes().into_iter().find(|n| n.id == id)
    }

    pub fn save_requests(&self) -> usize {
        self.save_requests.load(Ordering::SeqCst)
    }

    /// Build the context menu the host would show for a right-click on `node`
    pub fn right_click(&self, node: &Arc<MemoryNode>) -> Menu {
        let menu = Menu::new();
        let handle: Arc<dyn CanvasNode> = node.clone();
        node.node_type.show_menu(&handle, &menu);
        menu
    }
}

impl Canvas for MemoryCanvas {
    fn nodes(&self) -> Vec<Arc<dyn CanvasNode>> {
        self.memory_nodes()
            .into_iter()
            .map(|n| n as Arc<dyn CanvasNode>)
            .collect()
    }

    fn create_text_node(&self, geometry: NodeGeometry) -> Arc<dyn CanvasNode> {
        self.add_text_node("", geometry)
    }

    fn request_save(&self) {
        self.save_requests.fetch_add(1, Ordering::SeqCst);
    }
}

fn default_menu_handler() -> MenuHandler {
    Arc::new(|_node: &Arc<dyn CanvasNode>, menu: &Menu| {
        menu.add_item(MenuItem::new("Edit").with_icon("pencil"));
        menu.add_item(MenuItem::new("Delete").with_icon("trash"));
    })
}

pub struct MemoryNode {
    id: String,
    geometry: NodeGeometry,
    text: RwLock<String>,
    color: RwLock<Option<ColorToken>>,
    text_history: Mutex<Vec<String>>,
    canvas: Weak<MemoryCanvas>,
    node_type: Arc<NodeType>,
}

impl MemoryNode {
    pub fn color(&self) -> Option<ColorToken> {
        self.color.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Every value passed to `set_text`, oldest first
    pub fn text_history(&self) -> Vec<String> {
        self.text_history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl CanvasNode for MemoryNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn text(&self) -> String {
        self.text.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn geometry(&self) -> NodeGeometry {
        self.geometry
    }

    fn set_text(&self, text: &str) {
        *self.text.write().unwrap_or_else(|e| e.into_inner()) = text.to_string();
        self.text_history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
    }

    fn set_color(&self, color: &ColorToken) {
        *self.color.write().unwrap_or_else(|e| e.into_inner()) = Some(color.clone());
    }

    fn canvas(&self) -> Option<Arc<dyn Canvas>> {
        self.canvas.upgrade().map(|c| c as Arc<dyn Canvas>)
    }

    fn node_type(&self) -> Arc<NodeType> {
        self.node_type.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_nodes_share_node_type() {
        let canvas = MemoryCanvas::new();
        let a = canvas.add_text_node("a", NodeGeometry::default());
        let b = canvas.add_text_node("b", NodeGeometry::default());

        assert!(Arc::ptr_eq(&a.node_type(), &b.node_type()));
        assert_ne!(a.id(), b.id());
        assert_eq!(canvas.nodes().len(), 2);
    }

    #[test]
    fn test_right_click_shows_host_items() {
        let canvas = MemoryCanvas::new();
        let node = canvas.add_text_node("hello", NodeGeometry::default());

        let menu = canvas.right_click(&node);
        assert_eq!(menu.labels(), vec!["Edit", "Delete"]);
    }

    #[test]
    fn test_set_text_records_history() {
        let canvas = MemoryCanvas::new();
        let node = canvas.add_text_node("", NodeGeometry::default());

        node.set_text("one");
        node.set_text("two");
        node.set_color(&ColorToken::new("#44CF6E"));

        assert_eq!(node.text(), "two");
        assert_eq!(node.text_history(), vec!["one", "two"]);
        assert_eq!(node.color(), Some(ColorToken::new("#44CF6E")));
    }

    #[test]
    fn test_node_reaches_canvas() {
        let canvas = MemoryCanvas::new();
        let node = canvas.add_text_node("", NodeGeometry::default());

        node.canvas().unwrap().request_save();
        assert_eq!(canvas.save_requests(), 1);

        drop(canvas);
        assert!(node.canvas().is_none());
    }

    #[test]
    fn test_open_canvas_triggers_leaf_change() {
        let workspace = MemoryWorkspace::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        workspace.events().on(
            crate::canvas::ACTIVE_LEAF_CHANGE_EVENT,
            Arc::new(move |_: &WorkspaceEvent| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(workspace.active_canvas().is_none());
        workspace.open_canvas(MemoryCanvas::new());
        assert!(workspace.active_canvas().is_some());
        workspace.close_canvas();
        assert!(workspace.active_canvas().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
