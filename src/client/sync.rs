use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    client::{
        api::CommentApi,
        cache::{apply_event, CommentCache, MergeOutcome},
        channel::{ChannelLink, ChannelSignal},
    },
    config::Config,
    error::{AppError, Result},
    models::{
        comment::{
            CommentPage, CreateMainCommentRequest, CreateReplyCommentRequest, MainComment,
            ReplyComment,
        },
        websocket::FanOutEvent,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Fetching the first page.
    Loading,
    /// Joined to the blog's room; pushed events keep the cache current.
    Live,
    /// Channel unavailable; page 1 is re-fetched on every poll tick.
    Degraded,
    Detached,
}

/// What a viewer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSnapshot {
    pub state: SyncState,
    pub cache: CommentCache,
    /// Poll cycles started while degraded.
    pub polls: u64,
    /// Last swallowed read failure, cleared by the next successful load.
    pub last_error: Option<String>,
}

const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub page_size: usize,
    pub poll_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 10,
            poll_interval: Duration::from_secs(10),
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.page_size(None),
            poll_interval: config.poll_interval(),
        }
    }
}

enum Command {
    LoadMore(oneshot::Sender<Result<usize>>),
    Refresh(oneshot::Sender<Result<()>>),
    PostComment(CreateMainCommentRequest, oneshot::Sender<Result<MainComment>>),
    PostReply(String, CreateReplyCommentRequest, oneshot::Sender<Result<ReplyComment>>),
    Detach(oneshot::Sender<()>),
}

enum PageKind {
    Initial,
    Poll,
    Refresh(oneshot::Sender<Result<()>>),
    More(oneshot::Sender<Result<usize>>),
}

// REST calls run off the loop and report back here.
enum Completion {
    Page(PageKind, Result<CommentPage>),
    Created(FanOutEvent),
}

/// Keeps one blog's comment thread in sync for one viewer.
///
/// A single task owns the cache, the channel subscription and the poll
/// timer. REST calls are spawned and their results fed back into that task,
/// so channel signals and timer ticks are never held up by a slow request.
pub struct SyncClient {
    blog_id: String,
    options: SyncOptions,
    api: Arc<dyn CommentApi>,
    link: ChannelLink,
    signals: mpsc::UnboundedReceiver<ChannelSignal>,
    signals_open: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    snapshot: watch::Sender<SyncSnapshot>,
    state: SyncState,
    cache: CommentCache,
    polls: u64,
    last_error: Option<String>,
    channel_connected: bool,
    poll_timer: Option<Interval>,
    poll_in_flight: bool,
}

impl SyncClient {
    /// Starts syncing `blog_id` and returns the viewer's handle.
    pub fn attach(
        blog_id: impl Into<String>,
        options: SyncOptions,
        api: Arc<dyn CommentApi>,
        link: ChannelLink,
        signals: mpsc::UnboundedReceiver<ChannelSignal>,
    ) -> SyncHandle {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (snapshot, snapshot_rx) = watch::channel(SyncSnapshot {
            state: SyncState::Loading,
            cache: CommentCache::new(),
            polls: 0,
            last_error: None,
        });

        let client = SyncClient {
            blog_id: blog_id.into(),
            options,
            api,
            link,
            signals,
            signals_open: true,
            commands,
            completions_tx,
            completions,
            snapshot,
            state: SyncState::Loading,
            cache: CommentCache::new(),
            polls: 0,
            last_error: None,
            channel_connected: false,
            poll_timer: None,
            poll_in_flight: false,
        };

        let task = tokio::spawn(client.run());
        SyncHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
            task,
        }
    }

    async fn run(mut self) {
        info!("Attaching to comments of blog {}", self.blog_id);
        self.fetch_page(1, PageKind::Initial);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Detach(done)) => {
                        self.detach();
                        let _ = done.send(());
                        return;
                    }
                    Some(command) => self.handle_command(command),
                    // The handle was dropped without detaching.
                    None => {
                        self.detach();
                        return;
                    }
                },
                signal = self.signals.recv(), if self.signals_open => match signal {
                    Some(signal) => self.handle_signal(signal),
                    None => {
                        warn!("Comment channel closed for blog {}", self.blog_id);
                        self.signals_open = false;
                        self.handle_signal(ChannelSignal::Disconnected);
                    }
                },
                Some(completion) = self.completions.recv() => self.handle_completion(completion),
                _ = next_tick(&mut self.poll_timer) => self.poll(),
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::LoadMore(reply) => {
                let next = self.cache.page + 1;
                self.fetch_page(next, PageKind::More(reply));
            }
            Command::Refresh(reply) => self.fetch_page(1, PageKind::Refresh(reply)),
            Command::PostComment(request, reply) => {
                let api = self.api.clone();
                let completions = self.completions_tx.clone();
                let blog_id = self.blog_id.clone();
                tokio::spawn(async move {
                    let result = api.create_main_comment(&blog_id, &request).await;
                    if let Ok(comment) = &result {
                        let _ = completions.send(Completion::Created(FanOutEvent::Main(comment.clone())));
                    }
                    let _ = reply.send(result);
                });
            }
            Command::PostReply(parent_comment_id, request, reply) => {
                let api = self.api.clone();
                let completions = self.completions_tx.clone();
                tokio::spawn(async move {
                    let result = api.create_reply_comment(&parent_comment_id, &request).await;
                    if let Ok(created) = &result {
                        let _ = completions.send(Completion::Created(FanOutEvent::Reply(created.clone())));
                    }
                    let _ = reply.send(result);
                });
            }
            // Handled by the loop itself.
            Command::Detach(done) => {
                let _ = done.send(());
            }
        }
    }

    fn handle_signal(&mut self, signal: ChannelSignal) {
        match signal {
            ChannelSignal::Connected => {
                self.channel_connected = true;
                if self.state == SyncState::Degraded {
                    self.enter_live();
                }
            }
            ChannelSignal::Disconnected => {
                self.channel_connected = false;
                if self.state == SyncState::Live {
                    self.enter_degraded();
                }
            }
            ChannelSignal::Event(event) => self.merge(&event),
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Created(event) => self.merge(&event),
            Completion::Page(kind, result) => self.apply_page(kind, result),
        }
    }

    fn apply_page(&mut self, kind: PageKind, result: Result<CommentPage>) {
        match kind {
            PageKind::Initial => {
                match result {
                    Ok(page) => self.replaced(page),
                    Err(e) => self.swallow("initial load", e),
                }
                if self.channel_connected {
                    self.enter_live();
                } else {
                    self.enter_degraded();
                }
            }
            PageKind::Poll => {
                self.poll_in_flight = false;
                match result {
                    Ok(page) => self.replaced(page),
                    Err(e) => self.swallow("poll", e),
                }
            }
            PageKind::Refresh(reply) => {
                let outcome = match result {
                    Ok(page) => {
                        self.replaced(page);
                        Ok(())
                    }
                    Err(e) => {
                        self.last_error = Some(e.to_string());
                        self.publish();
                        Err(e)
                    }
                };
                let _ = reply.send(outcome);
            }
            PageKind::More(reply) => {
                let outcome = match result {
                    Ok(page) => {
                        let appended = self.cache.append_page(page);
                        self.last_error = None;
                        self.publish();
                        Ok(appended)
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(outcome);
            }
        }
    }

    fn enter_live(&mut self) {
        // The last wholesale reload stands in for a fresh snapshot.
        self.poll_timer = None;
        self.link.join(&self.blog_id);
        self.set_state(SyncState::Live);
    }

    fn enter_degraded(&mut self) {
        let period = self.options.poll_interval.max(MIN_POLL_INTERVAL);
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.poll_timer = Some(timer);
        self.set_state(SyncState::Degraded);
    }

    fn detach(&mut self) {
        self.poll_timer = None;
        if self.state == SyncState::Live {
            self.link.leave(&self.blog_id);
        }
        self.set_state(SyncState::Detached);
        info!("Detached from comments of blog {}", self.blog_id);
    }

    fn poll(&mut self) {
        self.polls += 1;
        self.publish();
        if self.poll_in_flight {
            debug!("Previous poll of blog {} still running, skipping", self.blog_id);
            return;
        }
        self.poll_in_flight = true;
        self.fetch_page(1, PageKind::Poll);
    }

    fn merge(&mut self, event: &FanOutEvent) {
        match apply_event(&mut self.cache, event) {
            MergeOutcome::Inserted => self.publish(),
            MergeOutcome::Duplicate => debug!("Ignoring duplicate comment {}", event.comment_id()),
            MergeOutcome::Orphaned => {
                debug!("Dropping reply {} to a comment not loaded", event.comment_id())
            }
        }
    }

    fn fetch_page(&self, page: usize, kind: PageKind) {
        let api = self.api.clone();
        let completions = self.completions_tx.clone();
        let blog_id = self.blog_id.clone();
        let limit = self.options.page_size;
        tokio::spawn(async move {
            let result = api.list_main_comments(&blog_id, page, limit).await;
            let _ = completions.send(Completion::Page(kind, result));
        });
    }

    fn replaced(&mut self, page: CommentPage) {
        self.cache.replace(page);
        self.last_error = None;
        self.publish();
    }

    fn swallow(&mut self, what: &str, error: AppError) {
        warn!("Comment {} for blog {} failed: {}", what, self.blog_id, error);
        self.last_error = Some(error.to_string());
        self.publish();
    }

    fn set_state(&mut self, state: SyncState) {
        if self.state != state {
            debug!("Blog {} sync {:?} -> {:?}", self.blog_id, self.state, state);
            self.state = state;
        }
        self.publish();
    }

    fn publish(&self) {
        let _ = self.snapshot.send(SyncSnapshot {
            state: self.state,
            cache: self.cache.clone(),
            polls: self.polls,
            last_error: self.last_error.clone(),
        });
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// The viewer's side of a `SyncClient`.
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SyncSnapshot>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn snapshot(&self) -> SyncSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.snapshot.clone()
    }

    /// Resolves with the first snapshot matching `predicate`, or the last
    /// one if the client stops first.
    pub async fn wait_until<F>(&self, predicate: F) -> SyncSnapshot
    where
        F: Fn(&SyncSnapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        loop {
            {
                let current = rx.borrow_and_update();
                if predicate(&current) {
                    return current.clone();
                }
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    /// Appends the next page; returns how many new comments it added.
    pub async fn load_more(&self) -> Result<usize> {
        self.request(Command::LoadMore).await?
    }

    /// Re-fetches page 1 and replaces the cache.
    pub async fn refresh(&self) -> Result<()> {
        self.request(Command::Refresh).await?
    }

    /// Creates a main comment and merges the stored comment locally.
    pub async fn post_comment(&self, author_id: &str, text: &str) -> Result<MainComment> {
        let request = CreateMainCommentRequest {
            author_id: Some(author_id.to_string()),
            text: Some(text.to_string()),
        };
        self.request(|reply| Command::PostComment(request, reply))
            .await?
    }

    /// Creates a reply and merges the stored reply locally.
    pub async fn post_reply(
        &self,
        parent_comment_id: &str,
        sender_id: &str,
        receiver_id: &str,
        text: &str,
    ) -> Result<ReplyComment> {
        let request = CreateReplyCommentRequest {
            sender_id: Some(sender_id.to_string()),
            receiver_id: Some(receiver_id.to_string()),
            text: Some(text.to_string()),
        };
        let parent_comment_id = parent_comment_id.to_string();
        self.request(|reply| Command::PostReply(parent_comment_id, request, reply))
            .await?
    }

    /// Stops polling and leaves the room. Returns once the client has
    /// stopped; the `leave` itself is not awaited.
    pub async fn detach(self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Detach(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
        let _ = self.task.await;
    }

    async fn request<T, F>(&self, command: F) -> Result<T>
    where
        F: FnOnce(oneshot::Sender<T>) -> Command,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .map_err(|_| AppError::internal("Sync client is detached"))?;
        reply_rx
            .await
            .map_err(|_| AppError::internal("Sync client is detached"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::comment::{Pagination, ReplyComment};
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-process stand-in for the REST surface.
    #[derive(Default)]
    struct FakeApi {
        comments: Mutex<Vec<MainComment>>,
        list_calls: AtomicUsize,
        fail_lists: Mutex<bool>,
    }

    impl FakeApi {
        fn with_comments(ids: &[&str]) -> Arc<Self> {
            let api = FakeApi::default();
            *api.comments.lock() = ids.iter().map(|id| main_comment(id)).collect();
            Arc::new(api)
        }

        fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CommentApi for FakeApi {
        async fn list_main_comments(
            &self,
            _blog_id: &str,
            page: usize,
            limit: usize,
        ) -> Result<CommentPage> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if *self.fail_lists.lock() {
                return Err(AppError::TransientIo("connection reset".to_string()));
            }
            let comments = self.comments.lock();
            Ok(CommentPage {
                comments: comments
                    .iter()
                    .skip((page - 1) * limit)
                    .take(limit)
                    .cloned()
                    .collect(),
                pagination: Pagination::new(page, limit, comments.len() as u64),
            })
        }

        async fn create_main_comment(
            &self,
            blog_id: &str,
            request: &CreateMainCommentRequest,
        ) -> Result<MainComment> {
            let mut comment = main_comment(&format!("new-{}", self.comments.lock().len()));
            comment.parent_entity_id = blog_id.to_string();
            comment.author_id = request.author_id.clone().unwrap_or_default();
            comment.text = request.text.clone().unwrap_or_default();
            self.comments.lock().insert(0, comment.clone());
            Ok(comment)
        }

        async fn create_reply_comment(
            &self,
            parent_comment_id: &str,
            _request: &CreateReplyCommentRequest,
        ) -> Result<ReplyComment> {
            if !self.comments.lock().iter().any(|c| c.id == parent_comment_id) {
                return Err(AppError::not_found("Comment"));
            }
            Ok(reply("r-new", parent_comment_id))
        }
    }

    fn main_comment(id: &str) -> MainComment {
        MainComment {
            id: id.to_string(),
            parent_entity_id: "b1".to_string(),
            author_id: "u1".to_string(),
            author_display_name: "Ada".to_string(),
            author_avatar_url: None,
            text: id.to_string(),
            created_at: Utc::now(),
            replies: Vec::new(),
        }
    }

    fn reply(id: &str, parent: &str) -> ReplyComment {
        ReplyComment {
            id: id.to_string(),
            parent_comment_id: parent.to_string(),
            sender_id: "u2".to_string(),
            sender_display_name: "Bob".to_string(),
            sender_avatar_url: None,
            recipient_id: "u1".to_string(),
            recipient_display_name: "Ada".to_string(),
            recipient_avatar_url: None,
            text: "reply".to_string(),
            created_at: Utc::now(),
        }
    }

    struct Harness {
        handle: SyncHandle,
        signals: mpsc::UnboundedSender<ChannelSignal>,
        outbound: mpsc::UnboundedReceiver<crate::models::websocket::ClientMessage>,
    }

    fn attach(api: Arc<FakeApi>, page_size: usize) -> Harness {
        attach_with(
            api,
            SyncOptions {
                page_size,
                poll_interval: Duration::from_secs(10),
            },
        )
    }

    fn attach_with(api: Arc<FakeApi>, options: SyncOptions) -> Harness {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let handle = SyncClient::attach("b1", options, api, ChannelLink::new(outbound_tx), signal_rx);
        Harness {
            handle,
            signals: signal_tx,
            outbound,
        }
    }

    async fn live(h: &Harness) -> SyncSnapshot {
        h.signals.send(ChannelSignal::Connected).unwrap();
        h.handle.wait_until(|s| s.state == SyncState::Live).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_load_then_live_joins_room() {
        let api = FakeApi::with_comments(&["c3", "c2", "c1"]);
        let mut h = attach(api, 2);

        let snapshot = live(&h).await;

        assert_eq!(snapshot.cache.len(), 2);
        assert_eq!(snapshot.cache.total, 3);
        assert!(snapshot.cache.has_more());
        assert_eq!(
            h.outbound.recv().await,
            Some(crate::models::websocket::ClientMessage::Join {
                room_key: "b1".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_channel_degrades_after_load() {
        let api = FakeApi::with_comments(&["c1"]);
        let h = attach(api, 10);

        h.signals.send(ChannelSignal::Disconnected).unwrap();
        let snapshot = h.handle.wait_until(|s| s.state == SyncState::Degraded).await;

        assert_eq!(snapshot.cache.len(), 1);
        assert_eq!(snapshot.polls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_while_degraded_and_stops_on_reconnect() {
        let api = FakeApi::with_comments(&["c1"]);
        let h = attach(api.clone(), 10);
        live(&h).await;

        h.signals.send(ChannelSignal::Disconnected).unwrap();
        h.handle.wait_until(|s| s.state == SyncState::Degraded).await;
        tokio::time::sleep(Duration::from_secs(25)).await;

        h.signals.send(ChannelSignal::Connected).unwrap();
        h.handle.wait_until(|s| s.state == SyncState::Live).await;
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(h.handle.snapshot().polls, 2);
        // One initial load plus the two polls; reconnecting does not reload.
        assert_eq!(api.list_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poll_interval_still_polls() {
        let api = FakeApi::with_comments(&["c1"]);
        let h = attach_with(
            api.clone(),
            SyncOptions {
                page_size: 10,
                poll_interval: Duration::ZERO,
            },
        );
        h.signals.send(ChannelSignal::Disconnected).unwrap();
        h.handle.wait_until(|s| s.state == SyncState::Degraded).await;

        tokio::time::sleep(Duration::from_millis(2500)).await;

        let snapshot = h.handle.snapshot();
        assert_eq!(snapshot.state, SyncState::Degraded);
        assert_eq!(snapshot.polls, 2);
        h.handle.refresh().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_replaces_cache_with_server_state() {
        let api = FakeApi::with_comments(&["c1"]);
        let h = attach(api.clone(), 10);
        h.signals.send(ChannelSignal::Disconnected).unwrap();
        h.handle.wait_until(|s| s.state == SyncState::Degraded).await;

        api.comments.lock().insert(0, main_comment("c2"));
        let snapshot = h.handle.wait_until(|s| s.cache.len() == 2).await;

        assert_eq!(snapshot.polls, 1);
        assert_eq!(snapshot.cache.comments[0].id, "c2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_echo_is_not_duplicated() {
        let api = FakeApi::with_comments(&["c1"]);
        let h = attach(api, 10);
        live(&h).await;

        let created = h.handle.post_comment("u1", "hello").await.unwrap();
        h.handle
            .wait_until(|s| s.cache.find(&created.id).is_some())
            .await;

        h.signals
            .send(ChannelSignal::Event(FanOutEvent::Main(created.clone())))
            .unwrap();
        h.signals
            .send(ChannelSignal::Event(FanOutEvent::Main(main_comment("c9"))))
            .unwrap();
        let snapshot = h.handle.wait_until(|s| s.cache.find("c9").is_some()).await;

        assert_eq!(snapshot.cache.len(), 3);
        assert_eq!(
            snapshot.cache.comments.iter().filter(|c| c.id == created.id).count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_events_merge_into_loaded_threads_only() {
        let api = FakeApi::with_comments(&["c2", "c1"]);
        let h = attach(api, 1);
        live(&h).await;

        h.signals
            .send(ChannelSignal::Event(FanOutEvent::Reply(reply("r1", "c1"))))
            .unwrap();
        h.signals
            .send(ChannelSignal::Event(FanOutEvent::Reply(reply("r2", "c2"))))
            .unwrap();
        let snapshot = h
            .handle
            .wait_until(|s| s.cache.find("c2").map_or(false, |c| !c.replies.is_empty()))
            .await;

        assert_eq!(snapshot.cache.len(), 1);
        assert_eq!(snapshot.cache.comments[0].replies[0].id, "r2");

        // c1 arrives with the next page, without the dropped reply.
        assert_eq!(h.handle.load_more().await.unwrap(), 1);
        let snapshot = h.handle.snapshot();
        assert!(snapshot.cache.find("c1").unwrap().replies.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_is_swallowed() {
        let api = FakeApi::with_comments(&["c1"]);
        let h = attach(api.clone(), 10);
        h.signals.send(ChannelSignal::Disconnected).unwrap();
        h.handle.wait_until(|s| s.state == SyncState::Degraded).await;

        *api.fail_lists.lock() = true;
        let snapshot = h.handle.wait_until(|s| s.last_error.is_some()).await;
        assert_eq!(snapshot.state, SyncState::Degraded);
        assert_eq!(snapshot.cache.len(), 1);

        *api.fail_lists.lock() = false;
        let snapshot = h.handle.wait_until(|s| s.polls == 2 && s.last_error.is_none()).await;
        assert_eq!(snapshot.cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_errors_reach_the_caller() {
        let api = FakeApi::with_comments(&["c1"]);
        let h = attach(api, 10);
        live(&h).await;

        let result = h.handle.post_reply("missing", "u2", "u1", "hi").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(h.handle.snapshot().state, SyncState::Live);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_stops_polling_and_leaves() {
        let api = FakeApi::with_comments(&["c1"]);
        let mut h = attach(api.clone(), 10);
        live(&h).await;
        h.outbound.recv().await;

        let mut watcher = h.handle.subscribe();
        h.handle.detach().await;

        assert_eq!(watcher.borrow_and_update().state, SyncState::Detached);
        assert_eq!(
            h.outbound.recv().await,
            Some(crate::models::websocket::ClientMessage::Leave {
                room_key: "b1".to_string()
            })
        );

        let calls = api.list_calls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.list_calls(), calls);
    }
}
