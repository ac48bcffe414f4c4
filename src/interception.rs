//! Per-node context menu hook.
//!
//! The host offers no event for "a canvas node's menu is being built", so the
//! interceptor wraps the menu handler shared by a node type. The wrapper runs
//! the host's handler first and then raises [`CANVAS_MENU_EVENT`] on the
//! workspace bus with the node and the menu being built.

use std::sync::{Arc, Weak};

use crate::canvas::{
    CanvasNode, Menu, MenuHandler, NodeType, Workspace, WorkspaceEvent, CANVAS_MENU_EVENT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    Installed,
    AlreadyInstalled,
    /// No active canvas, or the canvas has no nodes to find a node type from
    Unavailable,
}

struct InterceptionBinding {
    node_type: Arc<NodeType>,
    original: MenuHandler,
    wrapper: MenuHandler,
}

/// Owns at most one wrapped node type
#[derive(Default)]
pub struct CanvasMenuInterceptor {
    binding: Option<InterceptionBinding>,
}

impl CanvasMenuInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_installed(&self) -> bool {
        self.binding.is_some()
    }

    pub fn install(&mut self, workspace: &Arc<dyn Workspace>) -> InstallStatus {
        let Some(canvas) = workspace.active_canvas() else {
            tracing::debug!("No active canvas, menu hook not installed");
            return InstallStatus::Unavailable;
        };
        let Some(first) = canvas.nodes().into_iter().next() else {
            tracing::debug!("Active canvas has no nodes, menu hook not installed");
            return InstallStatus::Unavailable;
        };

        let node_type = first.node_type();
        if let Some(binding) = &self.binding {
            if Arc::ptr_eq(&node_type.menu_handler(), &binding.wrapper) {
                return InstallStatus::AlreadyInstalled;
            }
        }

        // Never keep two node types wrapped
        self.uninstall();

        let original = node_type.menu_handler();
        let wrapper = wrap_menu_handler(original.clone(), Arc::downgrade(workspace));
        node_type.replace_menu_handler(wrapper.clone());

        tracing::info!(node_type = node_type.name(), "Installed canvas menu hook");

        self.binding = Some(InterceptionBinding {
            node_type,
            original,
            wrapper,
        });
        InstallStatus::Installed
    }

    /// Put the original handler back. Returns false if nothing was installed.
    pub fn uninstall(&mut self) -> bool {
        let Some(binding) = self.binding.take() else {
            return false;
        };
        binding.node_type.replace_menu_handler(binding.original);
        tracing::info!(node_type = binding.node_type.name(), "Removed canvas menu hook");
        true
    }
}

impl Drop for CanvasMenuInterceptor {
    fn drop(&mut self) {
        self.uninstall();
    }
}

fn wrap_menu_handler(original: MenuHandler, workspace: Weak<dyn Workspace>) -> MenuHandler {
    Arc::new(move |node: &Arc<dyn CanvasNode>, menu: &Menu| {
        original(node, menu);

        if let Some(workspace) = workspace.upgrade() {
            tracing::trace!(node = node.id(), event = CANVAS_MENU_EVENT, "Node menu opened");
            workspace.events().trigger(&WorkspaceEvent::CanvasMenu {
                node: node.clone(),
                menu: menu.clone(),
            });
        }
    })
}
