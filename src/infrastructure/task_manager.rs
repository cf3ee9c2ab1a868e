use tokio::task::JoinHandle;

/// Tracks background tasks so the channel can cancel everything at once.
///
/// `disconnect()`'s contract (no live timers afterwards) is implemented by
/// routing every spawned task through this manager and calling
/// [`abort_all`](Self::abort_all).
pub struct TaskManager {
    handles: Vec<JoinHandle<()>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Spawn a task and track it
    pub fn spawn<F>(&mut self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.reap();
        let handle = tokio::spawn(future);
        self.handles.push(handle);
    }

    /// Abort all tasks without waiting
    pub fn abort_all(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
        self.handles.clear();
    }

    /// Drop handles of tasks that already ran to completion
    fn reap(&mut self) {
        self.handles.retain(|h| !h.is_finished());
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.abort_all();
    }
}
