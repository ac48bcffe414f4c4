use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::menu::Menu;
use super::CanvasNode;

/// Raised after a canvas node's own context menu has been populated
pub const CANVAS_MENU_EVENT: &str = "llm-instruction:canvas-menu";

/// Raised by the host whenever the active view changes
pub const ACTIVE_LEAF_CHANGE_EVENT: &str = "active-leaf-change";

/// Events carried on the workspace bus
#[derive(Clone)]
pub enum WorkspaceEvent {
    ActiveLeafChange,
    CanvasMenu {
        node: Arc<dyn CanvasNode>,
        menu: Menu,
    },
    Custom {
        name: String,
        payload: serde_json::Value,
    },
}

impl WorkspaceEvent {
    pub fn name(&self) -> &str {
        match self {
            WorkspaceEvent::ActiveLeafChange => ACTIVE_LEAF_CHANGE_EVENT,
            WorkspaceEvent::CanvasMenu { .. } => CANVAS_MENU_EVENT,
            WorkspaceEvent::Custom { name, .. } => name,
        }
    }
}

impl fmt::Debug for WorkspaceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkspaceEvent::ActiveLeafChange => f.write_str("ActiveLeafChange"),
            WorkspaceEvent::CanvasMenu { node, menu } => f
                .debug_struct("CanvasMenu")
                .field("node", &node.id())
                .field("items", &menu.len())
                .finish(),
            WorkspaceEvent::Custom { name, payload } => f
                .debug_struct("Custom")
                .field("name", name)
                .field("payload", payload)
                .finish(),
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&WorkspaceEvent) + Send + Sync>;

/// Subscription handle returned by [`EventBus::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventRef(u64);

/// Named publish/subscribe bus
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<String, Vec<(EventRef, EventHandler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, name: &str, handler: EventHandler) -> EventRef {
        let event_ref = EventRef(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(name.to_string())
            .or_default()
            .push((event_ref, handler));
        event_ref
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn off(&self, event_ref: EventRef) -> bool {
        let mut handlers = self.lock();
        for subscribers in handlers.values_mut() {
            if let Some(pos) = subscribers.iter().position(|(r, _)| *r == event_ref) {
                subscribers.remove(pos);
                return true;
            }
        }
        false
    }

    /// Call every handler subscribed to the event's name, in subscription
    /// order. Returns how many were called.
    pub fn trigger(&self, event: &WorkspaceEvent) -> usize {
        // Handlers may subscribe or unsubscribe while running
        let subscribers: Vec<EventHandler> = self
            .lock()
            .get(event.name())
            .map(|subs| subs.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        tracing::trace!(event = event.name(), handlers = subscribers.len(), "Triggering event");

        for handler in &subscribers {
            handler(event);
        }
        subscribers.len()
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.lock().get(name).map(Vec::len).unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(EventRef, EventHandler)>>> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_handler(counter: &Arc<AtomicUsize>) -> EventHandler {
        let counter = counter.clone();
        Arc::new(move |_: &WorkspaceEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_trigger_only_matching_name() {
        let bus = EventBus::new();
        let leaf = Arc::new(AtomicUsize::new(0));
        let custom = Arc::new(AtomicUsize::new(0));

        bus.on(ACTIVE_LEAF_CHANGE_EVENT, counter_handler(&leaf));
        bus.on("my-plugin:ping", counter_handler(&custom));

        assert_eq!(bus.trigger(&WorkspaceEvent::ActiveLeafChange), 1);
        assert_eq!(
            bus.trigger(&WorkspaceEvent::Custom {
                name: "my-plugin:ping".to_string(),
                payload: serde_json::json!({ "n": 1 }),
            }),
            1
        );
        assert_eq!(leaf.load(Ordering::SeqCst), 1);
        assert_eq!(custom.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_removes_handler() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let event_ref = bus.on(ACTIVE_LEAF_CHANGE_EVENT, counter_handler(&counter));

        assert!(bus.off(event_ref));
        assert!(!bus.off(event_ref));
        assert_eq!(bus.trigger(&WorkspaceEvent::ActiveLeafChange), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(bus.handler_count(ACTIVE_LEAF_CHANGE_EVENT), 0);
    }

    #[test]
    fn test_handler_can_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<EventRef>>> = Arc::new(Mutex::new(None));

        let bus_clone = bus.clone();
        let slot_clone = slot.clone();
        let event_ref = bus.on(
            ACTIVE_LEAF_CHANGE_EVENT,
            Arc::new(move |_: &WorkspaceEvent| {
                if let Some(r) = *slot_clone.lock().unwrap() {
                    bus_clone.off(r);
                }
            }),
        );
        *slot.lock().unwrap() = Some(event_ref);

        assert_eq!(bus.trigger(&WorkspaceEvent::ActiveLeafChange), 1);
        assert_eq!(bus.trigger(&WorkspaceEvent::ActiveLeafChange), 0);
    }
}
