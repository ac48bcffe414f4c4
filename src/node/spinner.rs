//! Animated "Prompting..." text shown while a request is in flight

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::canvas::CanvasNode;

pub const FRAME_INTERVAL: Duration = Duration::from_millis(250);

const FRAMES: &[&str] = &["|", "/", "-", "\\"];

/// Frame cycle for the indicator
#[derive(Debug, Clone, Default)]
pub struct Spinner {
    frame_index: usize,
}

impl Spinner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_frame(&self) -> &'static str {
        FRAMES[self.frame_index]
    }

    pub fn advance(&mut self) {
        self.frame_index = (self.frame_index + 1) % FRAMES.len();
    }

    /// Node text for the current frame
    pub fn render(&self) -> String {
        format!(" `{}` Prompting...", self.current_frame())
    }
}

#[derive(Debug, Default)]
struct IndicatorState {
    stopped: bool,
    spinner: Spinner,
}

/// Periodically rewrites a node's text until stopped.
///
/// Ticks and [`ProgressIndicator::stop`] take the same lock, so once `stop`
/// returns no further frame reaches the node.
pub struct ProgressIndicator {
    state: Arc<Mutex<IndicatorState>>,
    task: Option<JoinHandle<()>>,
}

impl ProgressIndicator {
    /// Start ticking on the current tokio runtime
    pub fn start(node: Arc<dyn CanvasNode>) -> Self {
        let state = Arc::new(Mutex::new(IndicatorState::default()));
        let task_state = state.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FRAME_INTERVAL);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let keep_going = {
                    let mut state = task_state.lock().unwrap_or_else(|e| e.into_inner());
                    if state.stopped {
                        false
                    } else {
                        node.set_text(&state.spinner.render());
                        state.spinner.advance();
                        true
                    }
                };
                if !keep_going {
                    break;
                }
            }
        });

        Self {
            state,
            task: Some(task),
        }
    }

    /// Stop ticking. Returns false if already stopped.
    pub fn stop(&mut self) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.stopped {
                return false;
            }
            state.stopped = true;
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        tracing::trace!("Progress indicator stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        !self.state.lock().unwrap_or_else(|e| e.into_inner()).stopped
    }
}

impl Drop for ProgressIndicator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::memory::MemoryCanvas;
    use crate::canvas::NodeGeometry;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_spinner_cycles_frames() {
        let mut spinner = Spinner::new();
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(spinner.current_frame());
            spinner.advance();
        }
        assert_eq!(seen, vec!["|", "/", "-", "\\", "|"]);
        assert_eq!(Spinner::new().render(), " `|` Prompting...");
    }

    #[tokio::test(start_paused = true)]
    async fn test_indicator_writes_frame_each_interval() {
        let canvas = MemoryCanvas::new();
        let node = canvas.add_text_node("", NodeGeometry::default());
        let _indicator = ProgressIndicator::start(node.clone());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(
            node.text_history(),
            vec![
                " `|` Prompting...",
                " `/` Prompting...",
                " `-` Prompting...",
                " `\\` Prompting...",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_after_stop() {
        let canvas = MemoryCanvas::new();
        let node = canvas.add_text_node("", NodeGeometry::default());
        let mut indicator = ProgressIndicator::start(node.clone());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(indicator.stop());
        node.set_text("final");

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(node.text(), "final");
        assert_eq!(node.text_history(), vec![" `|` Prompting...", "final"]);
        assert!(!indicator.is_running());
        assert!(!indicator.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_indicator() {
        let canvas = MemoryCanvas::new();
        let node = canvas.add_text_node("", NodeGeometry::default());

        drop(ProgressIndicator::start(node.clone()));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(node.text_history().is_empty());
    }
}
