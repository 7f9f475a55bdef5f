//! Background polling of the workspace's plugin task list
//!
//! Install and upgrade calls only queue server-side tasks. [`TaskPoller`]
//! keeps re-fetching the task list while any task is pending or running,
//! goes quiet once all of them settled, and then asks a
//! [`RefreshPluginList`] to refresh whatever depends on the installed set.

use super::refresh::RefreshPluginList;
use super::service::PluginService;
use super::types::{PluginCategory, PluginTask, TaskList};
use crate::api::ApiError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

/// Default re-poll interval while tasks are in flight
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Where the poller reads the task list from
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn fetch_tasks(&self) -> Result<TaskList, ApiError>;
}

#[async_trait]
impl TaskSource for PluginService {
    async fn fetch_tasks(&self) -> Result<TaskList, ApiError> {
        self.plugin_tasks().await
    }
}

/// Delay before the next poll, or `None` once every task is terminal.
///
/// Keeps polling while no list has been received yet.
pub fn refetch_interval(data: Option<&TaskList>, interval: Duration) -> Option<Duration> {
    match data {
        Some(list) if list.all_terminal() => None,
        _ => Some(interval),
    }
}

/// All tasks settled, there was at least one, and not every one failed
pub fn should_refresh(data: &TaskList) -> bool {
    data.all_terminal() && !data.tasks.is_empty() && !data.all_failed()
}

/// What subscribers see after each fetch cycle
#[derive(Debug, Clone, Default)]
pub struct TaskSnapshot {
    pub data: Option<TaskList>,
    pub is_fetched: bool,
    pub is_fetching: bool,
    /// A next poll is scheduled
    pub polling: bool,
    pub fetch_count: u64,
    pub last_error: Option<String>,
}

impl TaskSnapshot {
    /// Current tasks, empty before the first successful fetch
    pub fn plugin_tasks(&self) -> &[PluginTask] {
        self.data.as_ref().map_or(&[], |d| d.tasks.as_slice())
    }
}

pub struct TaskPoller {
    source: Arc<dyn TaskSource>,
    refresher: Arc<dyn RefreshPluginList>,
    interval: Duration,
    category: Option<PluginCategory>,
    enabled: bool,
}

impl TaskPoller {
    pub fn new(source: Arc<dyn TaskSource>, refresher: Arc<dyn RefreshPluginList>) -> Self {
        Self {
            source,
            refresher,
            interval: DEFAULT_POLL_INTERVAL,
            category: None,
            enabled: true,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Scope the plugin-list refresh to one category
    pub fn with_category(mut self, category: Option<PluginCategory>) -> Self {
        self.category = category;
        self
    }

    /// Only callers with management capability poll; otherwise nothing is fetched
    pub fn enabled(mut self, can_manage: bool) -> Self {
        self.enabled = can_manage;
        self
    }

    /// Spawn the polling loop on the current tokio runtime
    pub fn start(self) -> TaskPollerHandle {
        let (state_tx, state_rx) = watch::channel(TaskSnapshot::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let refetch = Arc::new(Notify::new());

        let join = tokio::spawn(self.run(state_tx, refetch.clone(), shutdown_rx));

        TaskPollerHandle {
            state: state_rx,
            refetch,
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }

    async fn run(
        self,
        state: watch::Sender<TaskSnapshot>,
        refetch: Arc<Notify>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if !self.enabled {
            tracing::debug!("task polling disabled: caller cannot manage plugins");
            return;
        }

        loop {
            state.send_modify(|s| s.is_fetching = true);
            let result = self.source.fetch_tasks().await;
            if let Ok(list) = &result {
                if should_refresh(list) {
                    tracing::info!("{} plugin task(s) settled", list.tasks.len());
                    self.refresher.refresh(self.category);
                }
            }

            let interval = self.interval;
            state.send_modify(|s| {
                s.is_fetching = false;
                s.is_fetched = true;
                s.fetch_count += 1;
                match result {
                    Ok(list) => {
                        s.data = Some(list);
                        s.last_error = None;
                    }
                    Err(e) => {
                        tracing::warn!("failed to fetch plugin tasks: {}", e);
                        s.last_error = Some(e.to_string());
                    }
                }
                s.polling = refetch_interval(s.data.as_ref(), interval).is_some();
            });

            let next = refetch_interval(state.borrow().data.as_ref(), interval);
            match next {
                Some(delay) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = refetch.notified() => {}
                        _ = shutdown.changed() => break,
                    }
                }
                None => {
                    tokio::select! {
                        _ = refetch.notified() => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }
        tracing::debug!("task polling stopped");
    }
}

/// Handle to a running [`TaskPoller`]
pub struct TaskPollerHandle {
    state: watch::Receiver<TaskSnapshot>,
    refetch: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl TaskPollerHandle {
    pub fn snapshot(&self) -> TaskSnapshot {
        self.state.borrow().clone()
    }

    pub fn tasks(&self) -> Vec<PluginTask> {
        self.state.borrow().plugin_tasks().to_vec()
    }

    pub fn is_polling(&self) -> bool {
        self.state.borrow().polling
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.state.clone()
    }

    /// Fetch now; resumes polling if new tasks are in flight
    pub fn refetch(&self) {
        self.refetch.notify_one();
    }

    /// Wait for the first snapshot matching `pred`. Returns the last snapshot
    /// if the poller exits first.
    pub async fn wait_for(&mut self, pred: impl Fn(&TaskSnapshot) -> bool) -> TaskSnapshot {
        loop {
            {
                let current = self.state.borrow_and_update();
                if pred(&current) {
                    return current.clone();
                }
            }
            if self.state.changed().await.is_err() {
                return self.state.borrow().clone();
            }
        }
    }

    /// Wait until a fetch completed and no further poll is scheduled
    pub async fn wait_until_settled(&mut self) -> TaskSnapshot {
        self.wait_for(|s| s.is_fetched && !s.is_fetching && !s.polling)
            .await
    }

    /// Stop polling and wait for the loop to exit
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                tracing::warn!("task poller ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for TaskPollerHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}
