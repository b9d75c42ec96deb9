//! Background worker that turns the pending query into cached forum pages.
//!
//! The worker polls [`SharedState`] for a pending query. Once the search
//! cooldown has passed it fetches the result page, clears the query and then
//! walks at most `max_links_per_cycle` forum links: cached ones are promoted,
//! the rest are fetched, extracted and stored. Fetch failures are logged and
//! only delay the next cycle.
//!
//! Fetched documents are not `Send`, so the worker owns a dedicated thread
//! with a single-threaded runtime. [`QueryWorker::start`] spawns it and
//! [`WorkerHandle::stop`] asks it to exit at its next poll.

use crate::config::WorkerConfig;
use crate::extract::extract;
use crate::fetch::{browser_headers, fetch_or_log, forum_headers, DocumentFetcher};
use crate::search::{build_search_url, forum_links};
use crate::state::SharedState;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// What a single poll of the worker did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing pending, or the cooldown has not elapsed yet.
    Idle,
    /// The search page could not be fetched; the query stays pending.
    SearchFailed,
    /// The search ran and this many forum links were visited.
    Scanned { links: usize },
}

pub struct QueryWorker<F> {
    state: Arc<SharedState>,
    fetcher: F,
    config: WorkerConfig,
    last_search: Option<Instant>,
}

impl<F: DocumentFetcher> QueryWorker<F> {
    pub fn new(state: Arc<SharedState>, fetcher: F, config: WorkerConfig) -> Self {
        Self {
            state,
            fetcher,
            config,
            last_search: None,
        }
    }

    fn cooldown_elapsed(&self) -> bool {
        self.last_search
            .map_or(true, |at| at.elapsed() > self.config.search_cooldown)
    }

    /// Poll until `token` is cancelled. Cancellation is noticed between
    /// polls; a fetch already in flight runs to completion.
    pub async fn run(mut self, token: CancellationToken) {
        info!("Query worker started");
        while !token.is_cancelled() {
            match self.poll_once().await {
                CycleOutcome::Scanned { .. } => continue,
                CycleOutcome::Idle | CycleOutcome::SearchFailed => {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }
        info!("Query worker stopped");
    }

    /// Run at most one search cycle.
    pub async fn poll_once(&mut self) -> CycleOutcome {
        let Some(query) = self.state.pending_query().filter(|q| !q.is_empty()) else {
            return CycleOutcome::Idle;
        };
        if !self.cooldown_elapsed() {
            return CycleOutcome::Idle;
        }

        let Some(links) = self.search(&query).await else {
            return CycleOutcome::SearchFailed;
        };
        let links = self.scan(links).await;
        CycleOutcome::Scanned { links }
    }

    async fn search(&mut self, query: &str) -> Option<Vec<String>> {
        let url = build_search_url(&self.config.search_url, query);
        info!("Searching: {}", url);

        let document = fetch_or_log(&self.fetcher, &url, Some(&browser_headers())).await?;
        self.last_search = Some(Instant::now());
        self.state.clear_pending_query(query);

        Some(forum_links(&document, &self.config.forum_prefix))
    }

    async fn scan(&self, links: Vec<String>) -> usize {
        let mut visited = 0;
        for url in links.into_iter().take(self.config.max_links_per_cycle) {
            if self.state.touch_if_cached(&url) {
                debug!("Query cache hit for {}", url);
            } else if let Some(document) =
                fetch_or_log(&self.fetcher, &url, Some(&forum_headers())).await
            {
                let content = extract(&document);
                if content.is_empty() {
                    debug!("No forum content extracted from {}", url);
                } else {
                    self.state.store(url.clone(), content);
                }
            }
            info!("Scanned forum link: {}", url);
            visited += 1;
        }
        visited
    }

    /// Move the worker onto its own thread and start polling.
    pub fn start(self) -> Result<WorkerHandle>
    where
        F: Send + 'static,
    {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let thread = std::thread::Builder::new()
            .name("query-worker".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to build query worker runtime: {}", e);
                        return;
                    }
                };
                runtime.block_on(self.run(worker_token));
            })
            .context("failed to spawn query worker thread")?;

        Ok(WorkerHandle {
            token,
            thread: Some(thread),
        })
    }
}

/// Owner-side control of a started [`QueryWorker`].
pub struct WorkerHandle {
    token: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Signal the worker and wait for its thread to exit.
    ///
    /// Blocks for as long as an in-flight fetch takes to finish or time out.
    pub fn stop(&mut self) {
        self.token.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Query worker thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::MockFetcher;
    use crate::fetch::FetchError;
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;
    use scraper::Html;
    use std::time::Duration;
    use tokio::time::advance;

    const SEARCH: &str = "https://search.test/search";
    const L1: &str = "https://www.ptt.cc/bbs/Gossiping/M.1.A.html";
    const L2: &str = "https://www.ptt.cc/bbs/Gossiping/M.2.A.html";
    const L3: &str = "https://www.ptt.cc/bbs/Gossiping/M.3.A.html";

    fn config() -> WorkerConfig {
        WorkerConfig {
            search_url: SEARCH.to_string(),
            ..WorkerConfig::default()
        }
    }

    fn search_url(query: &str) -> String {
        format!("{SEARCH}?q={query}")
    }

    fn results_page(links: &[&str]) -> String {
        let anchors: String = links
            .iter()
            .map(|l| format!("<a href=\"/url?q={l}&amp;sa=U\">result</a>"))
            .collect();
        format!("<html><body><a href=\"https://example.com/\">ad</a>{anchors}</body></html>")
    }

    fn thread_page(text: &str) -> String {
        format!("<html><body><div id=\"main-content\"><div class=\"content\">{text}</div></div></body></html>")
    }

    fn setup(fetcher: MockFetcher) -> (Arc<SharedState>, Arc<MockFetcher>, QueryWorker<Arc<MockFetcher>>) {
        let state = Arc::new(SharedState::new("ptt"));
        let fetcher = Arc::new(fetcher);
        let worker = QueryWorker::new(Arc::clone(&state), Arc::clone(&fetcher), config());
        (state, fetcher, worker)
    }

    fn searches(fetcher: &MockFetcher) -> usize {
        fetcher
            .requested()
            .iter()
            .filter(|u| u.starts_with(SEARCH))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_without_pending_query() {
        let (_state, fetcher, mut worker) = setup(MockFetcher::new());
        assert_eq!(worker.poll_once().await, CycleOutcome::Idle);
        assert!(fetcher.requested().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scans_at_most_two_forum_links() {
        let fetcher = MockFetcher::new()
            .page(&search_url("rust+ptt"), &results_page(&[L1, L2, L3]))
            .page(L1, &thread_page("one"))
            .page(L2, &thread_page("two"))
            .page(L3, &thread_page("three"));
        let (state, fetcher, mut worker) = setup(fetcher);
        state.set_pending_query("rust+ptt".to_string());

        assert_eq!(worker.poll_once().await, CycleOutcome::Scanned { links: 2 });
        assert_eq!(state.cached_urls(), vec![L2, L1]);
        assert_eq!(state.recent_context(2), vec!["two", "one"]);
        assert_eq!(fetcher.request_count(L3), 0);
        assert_eq!(state.pending_query(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_blocks_second_search() {
        let fetcher = MockFetcher::new()
            .page(&search_url("a+ptt"), &results_page(&[]))
            .page(&search_url("b+ptt"), &results_page(&[]));
        let (state, fetcher, mut worker) = setup(fetcher);

        state.set_pending_query("a+ptt".to_string());
        assert_eq!(worker.poll_once().await, CycleOutcome::Scanned { links: 0 });

        for _ in 0..5 {
            state.set_pending_query("b+ptt".to_string());
            assert_eq!(worker.poll_once().await, CycleOutcome::Idle);
        }
        advance(Duration::from_millis(2900)).await;
        assert_eq!(worker.poll_once().await, CycleOutcome::Idle);
        advance(Duration::from_millis(100)).await;
        assert_eq!(worker.poll_once().await, CycleOutcome::Idle);
        assert_eq!(searches(&fetcher), 1);

        advance(Duration::from_millis(1)).await;
        assert_eq!(worker.poll_once().await, CycleOutcome::Scanned { links: 0 });
        assert_eq!(searches(&fetcher), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_failure_keeps_query_and_cooldown() {
        let fetcher = MockFetcher::new().page(&search_url("rust+ptt"), &results_page(&[]));
        fetcher.fail(&search_url("rust+ptt"), 429);
        let (state, fetcher, mut worker) = setup(fetcher);
        state.set_pending_query("rust+ptt".to_string());

        assert_eq!(worker.poll_once().await, CycleOutcome::SearchFailed);
        assert_eq!(state.pending_query().as_deref(), Some("rust+ptt"));

        fetcher.heal(&search_url("rust+ptt"));
        assert_eq!(worker.poll_once().await, CycleOutcome::Scanned { links: 0 });
        assert_eq!(state.pending_query(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_link_is_touched_not_refetched() {
        let fetcher = MockFetcher::new()
            .page(&search_url("rust+ptt"), &results_page(&[L1, L2]))
            .page(L1, &thread_page("fresh"))
            .page(L2, &thread_page("two"));
        let (state, fetcher, mut worker) = setup(fetcher);
        state.store(L1.to_string(), "old".to_string());
        state.store(L3.to_string(), "three".to_string());
        state.set_pending_query("rust+ptt".to_string());

        worker.poll_once().await;
        assert_eq!(fetcher.request_count(L1), 0);
        assert_eq!(state.recent_context(3), vec!["two", "old", "three"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_and_empty_links_do_not_abort_scan() {
        let fetcher = MockFetcher::new()
            .page(&search_url("rust+ptt"), &results_page(&[L1, L2]))
            .page(L2, &thread_page("two"));
        fetcher.fail(L1, 500);
        let (state, _fetcher, mut worker) = setup(fetcher);
        state.set_pending_query("rust+ptt".to_string());

        assert_eq!(worker.poll_once().await, CycleOutcome::Scanned { links: 2 });
        assert_eq!(state.cached_urls(), vec![L2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_extraction_is_not_cached() {
        let fetcher = MockFetcher::new()
            .page(&search_url("rust+ptt"), &results_page(&[L1]))
            .page(L1, "<html><body><p>gone</p></body></html>");
        let (state, _fetcher, mut worker) = setup(fetcher);
        state.set_pending_query("rust+ptt".to_string());

        assert_eq!(worker.poll_once().await, CycleOutcome::Scanned { links: 1 });
        assert!(state.cached_urls().is_empty());
    }

    /// Writes a newer query while the search request is in flight.
    struct RacingFetcher {
        inner: MockFetcher,
        state: Arc<SharedState>,
    }

    #[async_trait(?Send)]
    impl DocumentFetcher for RacingFetcher {
        async fn fetch(&self, url: &str, headers: Option<&HeaderMap>) -> Result<Html, FetchError> {
            if url.starts_with(SEARCH) {
                self.state.set_pending_query("newer+ptt".to_string());
            }
            self.inner.fetch(url, headers).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_written_during_search_stays_pending() {
        let state = Arc::new(SharedState::new("ptt"));
        let fetcher = RacingFetcher {
            inner: MockFetcher::new().page(&search_url("rust+ptt"), &results_page(&[])),
            state: Arc::clone(&state),
        };
        let mut worker = QueryWorker::new(Arc::clone(&state), fetcher, config());
        state.set_pending_query("rust+ptt".to_string());

        assert_eq!(worker.poll_once().await, CycleOutcome::Scanned { links: 0 });
        assert_eq!(state.pending_query().as_deref(), Some("newer+ptt"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_after_cancel() {
        let fetcher = MockFetcher::new()
            .page(&search_url("rust+ptt"), &results_page(&[L1]))
            .page(L1, &thread_page("one"));
        let (state, _fetcher, worker) = setup(fetcher);
        state.set_pending_query("rust+ptt".to_string());

        let token = CancellationToken::new();
        let stopper = token.clone();
        tokio::join!(worker.run(token), async move {
            sleep(Duration::from_secs(2)).await;
            stopper.cancel();
        });

        assert_eq!(state.recent_context(2), vec!["one"]);
    }

    #[test]
    fn test_start_and_stop_dedicated_thread() {
        let fetcher = MockFetcher::new()
            .page(&search_url("rust+ptt"), &results_page(&[L1]))
            .page(L1, &thread_page("one"));
        let state = Arc::new(SharedState::new("ptt"));
        let worker = QueryWorker::new(
            Arc::clone(&state),
            Arc::new(fetcher),
            WorkerConfig {
                poll_interval: Duration::from_millis(10),
                ..config()
            },
        );

        let mut handle = worker.start().unwrap();
        assert!(state.submit_query(&["rust".to_string()]).is_some());
        for _ in 0..500 {
            if !state.cached_urls().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        handle.stop();

        assert!(!handle.is_running());
        assert_eq!(state.cached_urls(), vec![L1]);
    }
}
