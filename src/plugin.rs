//! Plugin lifecycle and the "LLM Instruction" command.
//!
//! Loading the plugin subscribes to the canvas menu event raised by the
//! interceptor and adds an "LLM Instruction" item to every node menu.
//! Clicking it spawns a generation that writes into a new node placed under
//! the clicked one.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::canvas::{
    CanvasNode, EventHandler, EventRef, Menu, MenuItem, Workspace, WorkspaceEvent,
    ACTIVE_LEAF_CHANGE_EVENT, CANVAS_MENU_EVENT,
};
use crate::config::PluginSettings;
use crate::error::{PluginError, Result};
use crate::interception::{CanvasMenuInterceptor, InstallStatus};
use crate::llm::template::{metadata_block, render, TemplateContext, PROMPT_TEMPLATE};
use crate::llm::{
    ClientOptions, CompletionClient, CompletionProvider, GenerationOutcome, GenerationRequest,
};
use crate::node::{ProgressIndicator, ResponseNode};

pub const MENU_ITEM_TITLE: &str = "LLM Instruction";
pub const MENU_ITEM_ICON: &str = "wand";
pub const EMPTY_RESPONSE_TEXT: &str = "`Empty response...`";

struct ProviderSlot {
    provider: Arc<dyn CompletionProvider>,
    /// Set by [`LlmInstructionPlugin::set_provider`]; settings changes no
    /// longer rebuild the client
    custom: bool,
}

struct PluginInner {
    settings: RwLock<PluginSettings>,
    provider: RwLock<ProviderSlot>,
    interceptor: Mutex<CanvasMenuInterceptor>,
    workspace: RwLock<Option<Arc<dyn Workspace>>>,
    event_refs: Mutex<Vec<EventRef>>,
    runtime: Handle,
    tasks: Mutex<Vec<JoinHandle<GenerationOutcome>>>,
}

/// The loaded plugin. Cheap to clone.
#[derive(Clone)]
pub struct LlmInstructionPlugin {
    inner: Arc<PluginInner>,
}

impl LlmInstructionPlugin {
    /// Create the plugin on the current tokio runtime
    pub fn new(settings: PluginSettings) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| PluginError::Runtime(format!("No tokio runtime: {}", e)))?;
        let client = CompletionClient::new(ClientOptions::new(settings.api_url.clone()))?;

        Ok(Self {
            inner: Arc::new(PluginInner {
                settings: RwLock::new(settings),
                provider: RwLock::new(ProviderSlot {
                    provider: Arc::new(client),
                    custom: false,
                }),
                interceptor: Mutex::new(CanvasMenuInterceptor::new()),
                workspace: RwLock::new(None),
                event_refs: Mutex::new(Vec::new()),
                runtime,
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Replace the completion backend
    pub fn set_provider(&self, provider: Arc<dyn CompletionProvider>) {
        tracing::debug!(provider = provider.name(), "Completion provider replaced");
        *self.inner.provider.write().unwrap_or_else(|e| e.into_inner()) = ProviderSlot {
            provider,
            custom: true,
        };
    }

    pub fn settings(&self) -> PluginSettings {
        self.inner.settings_snapshot()
    }

    /// Apply new settings. Requests already running keep their snapshot.
    pub fn update_settings(&self, settings: PluginSettings) -> Result<()> {
        settings.validate()?;

        let url_changed = self.inner.settings_snapshot().api_url != settings.api_url;
        if url_changed {
            let mut slot = self.inner.provider.write().unwrap_or_else(|e| e.into_inner());
            if !slot.custom {
                let client = CompletionClient::new(ClientOptions::new(settings.api_url.clone()))?;
                slot.provider = Arc::new(client);
            }
        }

        *self.inner.settings.write().unwrap_or_else(|e| e.into_inner()) = settings;
        tracing::info!(url_changed, "Settings updated");
        Ok(())
    }

    /// Subscribe to workspace events and try to install the menu hook
    pub fn on_load(&self, workspace: Arc<dyn Workspace>) {
        let loaded = self.inner.workspace.read().unwrap_or_else(|e| e.into_inner()).is_some();
        if loaded {
            self.on_unload();
        }

        *self.inner.workspace.write().unwrap_or_else(|e| e.into_inner()) = Some(workspace.clone());

        let weak = Arc::downgrade(&self.inner);
        let menu_handler: EventHandler = Arc::new(move |event: &WorkspaceEvent| {
            let WorkspaceEvent::CanvasMenu { node, menu } = event else {
                return;
            };
            if let Some(inner) = weak.upgrade() {
                inner.add_menu_item(node, menu);
            }
        });

        // The active view may not be a canvas yet
        let weak = Arc::downgrade(&self.inner);
        let retry_handler: EventHandler = Arc::new(move |_: &WorkspaceEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.install_hook();
            }
        });

        {
            let events = workspace.events();
            let mut refs = self.inner.lock_event_refs();
            refs.push(events.on(CANVAS_MENU_EVENT, menu_handler));
            refs.push(events.on(ACTIVE_LEAF_CHANGE_EVENT, retry_handler));
        }

        let status = self.inner.install_hook();
        tracing::info!(?status, "Plugin loaded");
    }

    /// Remove the menu hook and every subscription. Running generations
    /// finish on their own.
    pub fn on_unload(&self) {
        let workspace = self
            .inner
            .workspace
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let refs = std::mem::take(&mut *self.inner.lock_event_refs());
        if let Some(workspace) = workspace {
            for event_ref in refs {
                workspace.events().off(event_ref);
            }
        }

        self.inner.lock_interceptor().uninstall();
        tracing::info!("Plugin unloaded");
    }

    pub fn is_menu_hook_installed(&self) -> bool {
        self.inner.lock_interceptor().is_installed()
    }

    /// Run the generation flow for `source` to completion
    pub async fn prompt_node(&self, source: Arc<dyn CanvasNode>) -> GenerationOutcome {
        self.inner.run_generation(source).await
    }

    /// Generations spawned from the menu that are still tracked. Finished
    /// ones are released whenever a new one is spawned.
    pub fn tracked_generations(&self) -> usize {
        self.inner.lock_tasks().len()
    }

    /// Wait for every tracked generation, including ones spawned while
    /// waiting, and return their outcomes in spawn order
    pub async fn wait_idle(&self) -> Vec<GenerationOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let pending = std::mem::take(&mut *self.inner.lock_tasks());
            if pending.is_empty() {
                return outcomes;
            }
            for task in pending {
                match task.await {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => {
                        tracing::error!(error = %e, "Generation task failed");
                        outcomes.push(GenerationOutcome::Failure(e.to_string()));
                    }
                }
            }
        }
    }
}

impl PluginInner {
    fn settings_snapshot(&self) -> PluginSettings {
        self.settings.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn provider(&self) -> Arc<dyn CompletionProvider> {
        self.provider
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .provider
            .clone()
    }

    fn lock_interceptor(&self) -> MutexGuard<'_, CanvasMenuInterceptor> {
        self.interceptor.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_event_refs(&self) -> MutexGuard<'_, Vec<EventRef>> {
        self.event_refs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<GenerationOutcome>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn install_hook(&self) -> InstallStatus {
        let workspace = self.workspace.read().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(workspace) = workspace else {
            return InstallStatus::Unavailable;
        };

        let status = self.lock_interceptor().install(&workspace);
        if status == InstallStatus::Unavailable {
            tracing::debug!("Canvas menu hook unavailable, retrying on next view change");
        }
        status
    }

    fn add_menu_item(self: &Arc<Self>, node: &Arc<dyn CanvasNode>, menu: &Menu) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let node = node.clone();

        menu.add_separator();
        menu.add_item(
            MenuItem::new(MENU_ITEM_TITLE)
                .with_icon(MENU_ITEM_ICON)
                .on_click(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.spawn_generation(node.clone());
                    }
                }),
        );
    }

    fn spawn_generation(self: &Arc<Self>, source: Arc<dyn CanvasNode>) {
        let inner = self.clone();
        let task = self
            .runtime
            .spawn(async move { inner.run_generation(source).await });
        let mut tasks = self.lock_tasks();
        // Outcomes are already on their nodes, only unfinished work is kept
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    async fn run_generation(&self, source: Arc<dyn CanvasNode>) -> GenerationOutcome {
        let settings = self.settings_snapshot();
        let provider = self.provider();

        let mut response = match ResponseNode::create(source.as_ref()) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(node = source.id(), error = %e, "Cannot create response node");
                return GenerationOutcome::Failure(e.to_string());
            }
        };
        let mut indicator = ProgressIndicator::start(response.handle());

        let prompt_text = source.text();
        let prompt = render(
            PROMPT_TEMPLATE,
            &TemplateContext::new().with("text", &prompt_text),
        );
        let request = GenerationRequest::new(prompt, &settings);

        tracing::info!(
            source = source.id(),
            response = response.id(),
            provider = provider.name(),
            "Prompting LLM"
        );

        let outcome = {
            let mut on_progress = |fragment: &str| {
                indicator.stop();
                response.append(fragment);
            };
            provider.generate(&request, &mut on_progress).await
        };

        indicator.stop();
        write_outcome(&response, &outcome, &settings, &request, &prompt_text);
        outcome
    }
}

/// Final text and color of the response node
fn write_outcome(
    response: &ResponseNode,
    outcome: &GenerationOutcome,
    settings: &PluginSettings,
    request: &GenerationRequest,
    prompt_text: &str,
) {
    match outcome {
        GenerationOutcome::Success { text, metadata } => {
            let mut body = text.clone();
            if settings.display_metadata {
                body.push_str(&metadata_block(metadata, request, prompt_text));
            }
            response.set_color(&settings.colors.success);
            response.set_text(&body);
        }
        GenerationOutcome::Empty => {
            response.set_text(EMPTY_RESPONSE_TEXT);
            response.set_color(&settings.colors.warning);
        }
        GenerationOutcome::Failure(description) => {
            response.set_text(&format!("Error: {}", description));
            response.set_color(&settings.colors.error);
        }
    }
}
