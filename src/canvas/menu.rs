use std::fmt;
use std::sync::{Arc, Mutex};

pub type MenuAction = Arc<dyn Fn() + Send + Sync>;

/// A context menu item with label, optional icon, and click action
#[derive(Clone)]
pub struct MenuItem {
    pub label: String,
    pub icon: Option<String>,
    pub enabled: bool,
    pub is_separator: bool,
    action: Option<MenuAction>,
}

impl MenuItem {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            icon: None,
            enabled: true,
            is_separator: false,
            action: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn on_click(mut self, action: impl Fn() + Send + Sync + 'static) -> Self {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn separator() -> Self {
        Self {
            label: String::new(),
            icon: None,
            enabled: false,
            is_separator: true,
            action: None,
        }
    }

    /// Run the click action. False for separators, disabled items and
    /// items without an action.
    pub fn activate(&self) -> bool {
        if !self.enabled || self.is_separator {
            return false;
        }
        match &self.action {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuItem")
            .field("label", &self.label)
            .field("icon", &self.icon)
            .field("enabled", &self.enabled)
            .field("is_separator", &self.is_separator)
            .field("has_action", &self.action.is_some())
            .finish()
    }
}

/// Right-click menu being assembled for one node. Cheap to clone; clones
/// share the same item list so every contributor appends to one menu.
#[derive(Clone, Default)]
pub struct Menu {
    items: Arc<Mutex<Vec<MenuItem>>>,
}

impl Menu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&self, item: MenuItem) {
        self.lock().push(item);
    }

    pub fn add_separator(&self) {
        self.add_item(MenuItem::separator());
    }

    pub fn items(&self) -> Vec<MenuItem> {
        self.lock().clone()
    }

    /// Labels in display order, separators rendered as `---`
    pub fn labels(&self) -> Vec<String> {
        self.lock()
            .iter()
            .map(|item| {
                if item.is_separator {
                    "---".to_string()
                } else {
                    item.label.clone()
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn find(&self, label: &str) -> Option<MenuItem> {
        self.lock()
            .iter()
            .find(|item| !item.is_separator && item.label == label)
            .cloned()
    }

    /// Click the first item with this label
    pub fn activate(&self, label: &str) -> bool {
        // Released before the action runs, actions may inspect the menu
        let item = self.find(label);
        item.map(|item| item.activate()).unwrap_or(false)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MenuItem>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for Menu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Menu").field("items", &self.labels()).finish()
    }
}
