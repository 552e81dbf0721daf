use chrono::Utc;
use domain::{
    protocol, DomainError, FullName, OutboxEvent, PendingSyncReply, ReplyKey, ReplyState,
};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use storage::Db;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info, warn};

use crate::traits::{ReplyPoster, UserSession};

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("invalid reply: {0}")]
    Invalid(#[from] DomainError),

    #[error("no user is logged in")]
    NotLoggedIn,

    #[error("reply to {} was already posted", .0.parent_contribution_id)]
    AlreadyPosted(ReplyKey),

    #[error("reply to {} is still being sent", .0.parent_contribution_id)]
    InFlight(ReplyKey),

    #[error("{0} is only available in debug builds")]
    DebugOnly(&'static str),

    #[error("couldn't send reply: {0:#}")]
    Remote(anyhow::Error),

    #[error("local storage failure: {0:#}")]
    Storage(anyhow::Error),

    #[error("reply delivery task stopped: {0}")]
    Aborted(String),
}

pub type ReplyListStream = BoxStream<'static, Result<Vec<PendingSyncReply>, OutboxError>>;

type InFlightKeys = Arc<Mutex<HashSet<ReplyKey>>>;

/// 回帖发件箱：先落库再发请求，本地记录始终反映最后已知状态。
///
/// 每次投递都在独立任务中完成，调用方超时或被丢弃时结果仍会写回。
/// 同一行在本进程内同时只有一次投递；没有投递任务持有的 POSTING 行视为中途崩溃的遗留，可以重发。
///
/// POSTED 行只会由调用方在刷新评论树、确认回帖已出现后通过 [`ReplyOutbox::reconcile`] 删除。
#[derive(Clone)]
pub struct ReplyOutbox {
    db: Db,
    poster: Arc<dyn ReplyPoster>,
    session: Arc<dyn UserSession>,
    tx_events: broadcast::Sender<OutboxEvent>,
    in_flight: InFlightKeys,
}

// 投递任务结束时 (包括 panic) 释放该行
struct InFlightGuard {
    keys: InFlightKeys,
    key: ReplyKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl ReplyOutbox {
    pub fn new(db: Db, poster: Arc<dyn ReplyPoster>, session: Arc<dyn UserSession>) -> Self {
        let (tx_events, _) = broadcast::channel(100);
        Self {
            db,
            poster,
            session,
            tx_events,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboxEvent> {
        self.tx_events.subscribe()
    }

    pub async fn submit(
        &self,
        parent_submission_id: FullName,
        parent_contribution_id: FullName,
        body: String,
    ) -> Result<PendingSyncReply, OutboxError> {
        self.submit_at(
            parent_submission_id,
            parent_contribution_id,
            body,
            Utc::now().timestamp_millis(),
        )
        .await
    }

    async fn submit_at(
        &self,
        parent_submission_id: FullName,
        parent_contribution_id: FullName,
        body: String,
        created_at_millis: i64,
    ) -> Result<PendingSyncReply, OutboxError> {
        let author = self
            .session
            .logged_in_user_name()
            .ok_or(OutboxError::NotLoggedIn)?;
        let mut reply = PendingSyncReply::posting(
            body,
            parent_submission_id,
            parent_contribution_id,
            author,
            created_at_millis,
        )?;

        // 同一作者同一毫秒回复同一对象时顺延时间戳，新回帖不能覆盖已有的行
        let guard = loop {
            if let Some(guard) = self.claim(reply.key()) {
                if self.find(&guard.key).await?.is_none() {
                    break guard;
                }
            }
            reply.created_at_millis += 1;
        };
        self.send(reply, guard).await
    }

    // 沿用原始的 created_at_millis 与作者，重发会覆盖同一行而不是新增一行
    pub async fn resend(&self, existing: PendingSyncReply) -> Result<PendingSyncReply, OutboxError> {
        if existing.state == ReplyState::Posted {
            return Err(OutboxError::AlreadyPosted(existing.key()));
        }
        let reply = PendingSyncReply::posting(
            existing.body,
            existing.parent_submission_id,
            existing.parent_contribution_id,
            existing.author_user_name,
            existing.created_at_millis,
        )?;
        let guard = self
            .claim(reply.key())
            .ok_or_else(|| OutboxError::InFlight(reply.key()))?;

        // 调用方手里的可能是旧副本，以库中状态为准
        if let Some(stored) = self.find(&guard.key).await? {
            if stored.state == ReplyState::Posted {
                return Err(OutboxError::AlreadyPosted(stored.key()));
            }
        }
        self.send(reply, guard).await
    }

    fn claim(&self, key: ReplyKey) -> Option<InFlightGuard> {
        let mut keys = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !keys.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            keys: self.in_flight.clone(),
            key,
        })
    }

    async fn send(
        &self,
        reply: PendingSyncReply,
        guard: InFlightGuard,
    ) -> Result<PendingSyncReply, OutboxError> {
        let outbox = self.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            outbox.deliver(reply).await
        });
        task.await
            .map_err(|e| OutboxError::Aborted(e.to_string()))?
    }

    async fn deliver(&self, reply: PendingSyncReply) -> Result<PendingSyncReply, OutboxError> {
        // 1. 发请求前先落库，崩溃后仍能找回这条回帖
        self.save(&reply).await?;

        // 2. 远端请求
        let posted = match self
            .poster
            .reply(&reply.parent_contribution_id, &reply.body)
            .await
        {
            Ok(remote_id) => protocol::reply_full_name(&remote_id).map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };

        // 3. 回写结果
        match posted {
            Ok(posted_id) => {
                let posted = reply.into_posted(posted_id);
                self.save(&posted).await?;
                info!(
                    "Reply to {} posted as {}",
                    posted.parent_contribution_id,
                    posted.posted_id.as_ref().map_or("?", FullName::as_str)
                );
                Ok(posted)
            }
            Err(e) => {
                error!("Couldn't send reply to {}: {:?}", reply.parent_contribution_id, e);
                self.save(&reply.into_failed()).await?;
                Err(OutboxError::Remote(e))
            }
        }
    }

    async fn save(&self, reply: &PendingSyncReply) -> Result<(), OutboxError> {
        self.db
            .upsert_pending_reply(reply)
            .await
            .map_err(OutboxError::Storage)?;
        let _ = self.tx_events.send(OutboxEvent::ReplySaved {
            reply: reply.clone(),
        });
        Ok(())
    }

    pub async fn find(&self, key: &ReplyKey) -> Result<Option<PendingSyncReply>, OutboxError> {
        self.db
            .get_pending_reply(key)
            .await
            .map_err(OutboxError::Storage)
    }

    /// 某个帖子下发送中或已发送、但评论树尚未刷新的回帖。
    pub async fn list_pending_or_posted(
        &self,
        parent_submission_id: &FullName,
    ) -> Result<Vec<PendingSyncReply>, OutboxError> {
        self.db
            .list_in_flight_replies(parent_submission_id)
            .await
            .map_err(OutboxError::Storage)
    }

    pub async fn list_failed(&self) -> Result<Vec<PendingSyncReply>, OutboxError> {
        self.db
            .list_failed_replies()
            .await
            .map_err(OutboxError::Storage)
    }

    pub fn stream_pending_or_posted(&self, parent_submission_id: FullName) -> ReplyListStream {
        let db = self.db.clone();
        let filter_id = parent_submission_id.clone();
        let changes = BroadcastStream::new(self.tx_events.subscribe()).filter_map(move |event| {
            // Lagged 时无法判断错过了什么，直接重新查询
            let relevant = match event {
                Ok(event) => event.touches_submission(&filter_id),
                Err(_) => true,
            };
            future::ready(relevant.then_some(()))
        });

        stream::once(future::ready(()))
            .chain(changes)
            .then(move |_| {
                let db = db.clone();
                let id = parent_submission_id.clone();
                async move {
                    db.list_in_flight_replies(&id)
                        .await
                        .map_err(OutboxError::Storage)
                }
            })
            .boxed()
    }

    pub fn stream_failed(&self) -> ReplyListStream {
        let db = self.db.clone();
        let changes = BroadcastStream::new(self.tx_events.subscribe()).map(|_| ());

        stream::once(future::ready(()))
            .chain(changes)
            .then(move |_| {
                let db = db.clone();
                async move { db.list_failed_replies().await.map_err(OutboxError::Storage) }
            })
            .boxed()
    }

    /// 调用方确认回帖已出现在远端评论树后调用；发件箱自身从不查询远端。
    pub async fn reconcile(&self, parent_submission_id: &FullName) -> Result<u64, OutboxError> {
        let count = self
            .db
            .delete_posted_replies(parent_submission_id)
            .await
            .map_err(OutboxError::Storage)?;
        if count > 0 {
            info!("Reconciled {} posted replies for {}", count, parent_submission_id);
        }
        self.notify_removed(Some(parent_submission_id.clone()), count);
        Ok(count)
    }

    // 重试队列里的"放弃"操作，只删除 FAILED 行
    pub async fn discard_failed(&self, key: &ReplyKey) -> Result<bool, OutboxError> {
        let count = self
            .db
            .delete_failed_reply(key)
            .await
            .map_err(OutboxError::Storage)?;
        if count == 0 {
            warn!("No failed reply to discard for {}", key.parent_contribution_id);
            return Ok(false);
        }
        // 删除前未读取所属帖子，按全局变更通知
        self.notify_removed(None, count);
        Ok(true)
    }

    pub async fn purge_all(&self) -> Result<u64, OutboxError> {
        if !cfg!(debug_assertions) {
            return Err(OutboxError::DebugOnly("purge_all"));
        }
        let count = self
            .db
            .delete_all_replies()
            .await
            .map_err(OutboxError::Storage)?;
        warn!("Purged {} pending sync replies", count);
        self.notify_removed(None, count);
        Ok(count)
    }

    fn notify_removed(&self, parent_submission_id: Option<FullName>, count: u64) {
        if count == 0 {
            return;
        }
        let _ = self.tx_events.send(OutboxEvent::RepliesRemoved {
            parent_submission_id,
            count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::session::StaticSession;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    // 按顺序返回预设结果，并记录调用时库里该回帖的状态
    struct FakePoster {
        db: Db,
        responses: Mutex<VecDeque<Result<String, String>>>,
        seen_states: Mutex<Vec<Option<ReplyState>>>,
    }

    impl FakePoster {
        fn new(db: &Db, responses: Vec<Result<&str, &str>>) -> Arc<Self> {
            Arc::new(Self {
                db: db.clone(),
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|r| r.map(String::from).map_err(String::from))
                        .collect(),
                ),
                seen_states: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen_states.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ReplyPoster for FakePoster {
        async fn reply(&self, parent: &FullName, _body: &str) -> anyhow::Result<String> {
            let in_flight = self
                .db
                .list_in_flight_replies(&name("t3_abc"))
                .await?
                .into_iter()
                .chain(self.db.list_failed_replies().await?)
                .find(|r| &r.parent_contribution_id == parent)
                .map(|r| r.state);
            self.seen_states.lock().unwrap().push(in_flight);

            let next = self.responses.lock().unwrap().pop_front();
            match next {
                Some(Ok(id)) => Ok(id),
                Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
                None => Err(anyhow::anyhow!("no scripted response")),
            }
        }
    }

    // 远端请求一直挂起，直到测试放行
    struct HeldPoster {
        release: Notify,
        calls: AtomicUsize,
        result: Result<&'static str, &'static str>,
    }

    impl HeldPoster {
        fn new(result: Result<&'static str, &'static str>) -> Arc<Self> {
            Arc::new(Self {
                release: Notify::new(),
                calls: AtomicUsize::new(0),
                result,
            })
        }
    }

    #[async_trait]
    impl ReplyPoster for HeldPoster {
        async fn reply(&self, _parent: &FullName, _body: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            self.result
                .map(String::from)
                .map_err(|msg| anyhow::anyhow!(msg))
        }
    }

    fn held_outbox(poster: &Arc<HeldPoster>, db: &Db) -> ReplyOutbox {
        ReplyOutbox::new(
            db.clone(),
            poster.clone(),
            Arc::new(StaticSession::new(Some("ferris".into()))),
        )
    }

    async fn first_non_empty(live: &mut ReplyListStream) -> Vec<PendingSyncReply> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let rows = live.next().await.unwrap().unwrap();
                if !rows.is_empty() {
                    return rows;
                }
            }
        })
        .await
        .unwrap()
    }

    fn name(s: &str) -> FullName {
        FullName::new(s).unwrap()
    }

    async fn outbox(
        responses: Vec<Result<&str, &str>>,
    ) -> (Db, Arc<FakePoster>, ReplyOutbox) {
        let db = Db::new("sqlite::memory:").await.unwrap();
        let poster = FakePoster::new(&db, responses);
        let session = Arc::new(StaticSession::new(Some("ferris".into())));
        let outbox = ReplyOutbox::new(db.clone(), poster.clone(), session);
        (db, poster, outbox)
    }

    fn failed_reply(parent: &str, created_at_millis: i64) -> PendingSyncReply {
        PendingSyncReply::posting(
            format!("reply to {}", parent),
            name("t3_abc"),
            name(parent),
            "ferris".into(),
            created_at_millis,
        )
        .unwrap()
        .into_failed()
    }

    #[tokio::test]
    async fn submit_success_stores_posted_full_name() {
        let (db, poster, outbox) = outbox(vec![Ok("xyz")]).await;

        let posted = outbox
            .submit(name("t3_abc"), name("t3_abc"), "hello".into())
            .await
            .unwrap();

        assert_eq!(posted.state, ReplyState::Posted);
        assert_eq!(posted.posted_id, Some(name("t1_xyz")));
        assert_eq!(posted.author_user_name, "ferris");

        let stored = db.get_pending_reply(&posted.key()).await.unwrap().unwrap();
        assert_eq!(stored, posted);
        assert_eq!(poster.calls(), 1);
    }

    #[tokio::test]
    async fn reply_is_persisted_as_posting_before_remote_call() {
        let (_db, poster, outbox) = outbox(vec![Ok("xyz")]).await;

        outbox
            .submit(name("t3_abc"), name("t1_parent"), "hello".into())
            .await
            .unwrap();

        let seen = poster.seen_states.lock().unwrap().clone();
        assert_eq!(seen, vec![Some(ReplyState::Posting)]);
    }

    #[tokio::test]
    async fn submit_failure_stores_failed_and_returns_error() {
        let (db, _poster, outbox) = outbox(vec![Err("RATELIMIT")]).await;

        let err = outbox
            .submit(name("t3_abc"), name("t3_abc"), "hello".into())
            .await
            .unwrap_err();
        assert!(matches!(&err, OutboxError::Remote(e) if e.to_string() == "RATELIMIT"));

        let failed = db.list_failed_replies().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].state, ReplyState::Failed);
        assert_eq!(failed[0].body, "hello");
        assert_eq!(failed[0].posted_id, None);
    }

    #[tokio::test]
    async fn blank_remote_id_counts_as_failure() {
        let (db, _poster, outbox) = outbox(vec![Ok("  ")]).await;

        let err = outbox
            .submit(name("t3_abc"), name("t3_abc"), "hello".into())
            .await
            .unwrap_err();

        assert!(matches!(err, OutboxError::Remote(_)));
        assert_eq!(db.list_failed_replies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resend_overwrites_the_failed_row() {
        let (db, poster, outbox) = outbox(vec![Err("timeout"), Err("timeout"), Ok("xyz")]).await;
        let original = failed_reply("t1_parent", 1_000);
        db.upsert_pending_reply(&original).await.unwrap();

        for _ in 0..2 {
            let stored = db.get_pending_reply(&original.key()).await.unwrap().unwrap();
            assert!(outbox.resend(stored).await.is_err());
        }
        let stored = db.get_pending_reply(&original.key()).await.unwrap().unwrap();
        let posted = outbox.resend(stored).await.unwrap();

        assert_eq!(posted.key(), original.key());
        assert_eq!(posted.posted_id, Some(name("t1_xyz")));
        assert!(db.list_failed_replies().await.unwrap().is_empty());
        assert_eq!(
            db.list_in_flight_replies(&name("t3_abc")).await.unwrap(),
            vec![posted]
        );
        assert_eq!(poster.calls(), 3);
    }

    #[tokio::test]
    async fn resend_keeps_original_author() {
        let (db, _poster, outbox) = outbox(vec![Ok("xyz")]).await;
        let mut original = failed_reply("t1_parent", 1_000);
        original.author_user_name = "someone_else".into();
        db.upsert_pending_reply(&original).await.unwrap();

        let posted = outbox.resend(original.clone()).await.unwrap();

        assert_eq!(posted.author_user_name, "someone_else");
        assert_eq!(posted.key(), original.key());
    }

    #[tokio::test]
    async fn posted_reply_cannot_be_resent() {
        let (_db, poster, outbox) = outbox(vec![Ok("again")]).await;
        let posted = failed_reply("t1_parent", 1).into_posted(name("t1_xyz"));

        let err = outbox.resend(posted).await.unwrap_err();

        assert!(matches!(err, OutboxError::AlreadyPosted(_)));
        assert_eq!(poster.calls(), 0);
    }

    #[tokio::test]
    async fn precondition_failures_write_nothing() {
        let db = Db::new("sqlite::memory:").await.unwrap();
        let poster = FakePoster::new(&db, vec![Ok("xyz")]);
        let logged_out = ReplyOutbox::new(
            db.clone(),
            poster.clone(),
            Arc::new(StaticSession::new(None)),
        );

        let err = logged_out
            .submit(name("t3_abc"), name("t3_abc"), "hello".into())
            .await
            .unwrap_err();
        assert!(matches!(err, OutboxError::NotLoggedIn));
        assert_eq!(poster.calls(), 0);

        let (db, poster, outbox) = outbox(vec![Ok("xyz")]).await;
        let err = outbox
            .submit(name("t3_abc"), name("t3_abc"), "   ".into())
            .await
            .unwrap_err();
        assert!(matches!(err, OutboxError::Invalid(DomainError::EmptyBody)));

        assert!(db.list_in_flight_replies(&name("t3_abc")).await.unwrap().is_empty());
        assert!(db.list_failed_replies().await.unwrap().is_empty());
        assert_eq!(poster.calls(), 0);
    }

    #[tokio::test]
    async fn storage_failure_is_not_recorded_as_remote_failure() {
        let (db, poster, outbox) = outbox(vec![Ok("xyz")]).await;
        db.close().await;

        let err = outbox
            .submit(name("t3_abc"), name("t3_abc"), "hello".into())
            .await
            .unwrap_err();

        assert!(matches!(err, OutboxError::Storage(_)));
        assert_eq!(poster.calls(), 0);
    }

    #[tokio::test]
    async fn queries_split_by_state() {
        let (db, _poster, outbox) = outbox(vec![Ok("one"), Err("nope")]).await;
        outbox
            .submit(name("t3_abc"), name("t1_first"), "first".into())
            .await
            .unwrap();
        let _ = outbox
            .submit(name("t3_abc"), name("t1_second"), "second".into())
            .await;
        let posting = PendingSyncReply::posting(
            "third".into(),
            name("t3_abc"),
            name("t1_third"),
            "ferris".into(),
            5,
        )
        .unwrap();
        db.upsert_pending_reply(&posting).await.unwrap();

        let in_flight = outbox.list_pending_or_posted(&name("t3_abc")).await.unwrap();
        assert_eq!(in_flight.len(), 2);
        assert!(in_flight.iter().all(|r| r.state.is_in_flight()));
        assert_eq!(in_flight[0], posting);

        let failed = outbox.list_failed().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].parent_contribution_id, name("t1_second"));
    }

    #[tokio::test]
    async fn failed_queue_spans_submissions_in_creation_order() {
        let (db, _poster, outbox) = outbox(vec![]).await;
        let mut later = failed_reply("t1_a", 20);
        later.parent_submission_id = name("t3_other");
        let earlier = failed_reply("t1_b", 10);
        db.upsert_pending_reply(&later).await.unwrap();
        db.upsert_pending_reply(&earlier).await.unwrap();

        let failed = outbox.list_failed().await.unwrap();

        assert_eq!(failed, vec![earlier, later]);
    }

    #[tokio::test]
    async fn reconcile_removes_posted_rows_of_one_submission() {
        let (db, _poster, outbox) = outbox(vec![]).await;
        let posted_here = failed_reply("t1_a", 1).into_posted(name("t1_x"));
        let failed_here = failed_reply("t1_b", 2);
        let mut posted_elsewhere = failed_reply("t1_c", 3).into_posted(name("t1_y"));
        posted_elsewhere.parent_submission_id = name("t3_other");
        for r in [&posted_here, &failed_here, &posted_elsewhere] {
            db.upsert_pending_reply(r).await.unwrap();
        }

        assert_eq!(outbox.reconcile(&name("t3_abc")).await.unwrap(), 1);

        assert!(outbox.list_pending_or_posted(&name("t3_abc")).await.unwrap().is_empty());
        assert_eq!(outbox.list_failed().await.unwrap(), vec![failed_here]);
        assert_eq!(
            outbox.list_pending_or_posted(&name("t3_other")).await.unwrap(),
            vec![posted_elsewhere]
        );
    }

    #[tokio::test]
    async fn discard_only_touches_failed_rows() {
        let (db, _poster, outbox) = outbox(vec![]).await;
        let failed = failed_reply("t1_a", 1);
        let posted = failed_reply("t1_b", 2).into_posted(name("t1_x"));
        db.upsert_pending_reply(&failed).await.unwrap();
        db.upsert_pending_reply(&posted).await.unwrap();

        assert!(!outbox.discard_failed(&posted.key()).await.unwrap());
        assert!(outbox.discard_failed(&failed.key()).await.unwrap());
        assert!(outbox.find(&failed.key()).await.unwrap().is_none());
        assert!(outbox.find(&posted.key()).await.unwrap().is_some());
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    async fn purge_clears_everything_in_debug_builds() {
        let (db, _poster, outbox) = outbox(vec![]).await;
        db.upsert_pending_reply(&failed_reply("t1_a", 1)).await.unwrap();
        db.upsert_pending_reply(&failed_reply("t1_b", 2).into_posted(name("t1_x")))
            .await
            .unwrap();

        assert_eq!(outbox.purge_all().await.unwrap(), 2);
        assert!(outbox.list_failed().await.unwrap().is_empty());
    }

    #[cfg(not(debug_assertions))]
    #[tokio::test]
    async fn purge_is_refused_in_release_builds() {
        let (db, _poster, outbox) = outbox(vec![]).await;
        db.upsert_pending_reply(&failed_reply("t1_a", 1)).await.unwrap();

        let err = outbox.purge_all().await.unwrap_err();

        assert!(matches!(err, OutboxError::DebugOnly(_)));
        assert_eq!(outbox.list_failed().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn live_query_redelivers_after_changes() {
        let (_db, _poster, outbox) = outbox(vec![Ok("xyz")]).await;
        let mut live = outbox.stream_pending_or_posted(name("t3_abc"));

        assert!(live.next().await.unwrap().unwrap().is_empty());

        let posted = outbox
            .submit(name("t3_abc"), name("t3_abc"), "hello".into())
            .await
            .unwrap();

        // POSTING 与 POSTED 各触发一次
        let after_posting = live.next().await.unwrap().unwrap();
        assert_eq!(after_posting.len(), 1);
        let after_posted = live.next().await.unwrap().unwrap();
        assert_eq!(after_posted, vec![posted]);

        outbox.reconcile(&name("t3_abc")).await.unwrap();
        assert!(live.next().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn live_failed_query_tracks_every_submission() {
        let (_db, _poster, outbox) = outbox(vec![Err("down")]).await;
        let mut live = outbox.stream_failed();
        assert!(live.next().await.unwrap().unwrap().is_empty());

        let _ = outbox
            .submit(name("t3_other"), name("t3_other"), "hello".into())
            .await;

        let _posting = live.next().await.unwrap().unwrap();
        let after_failure = live.next().await.unwrap().unwrap();
        assert_eq!(after_failure.len(), 1);
        assert_eq!(after_failure[0].body, "hello");
    }

    #[tokio::test]
    async fn caller_timeout_still_records_the_outcome() {
        let db = Db::new("sqlite::memory:").await.unwrap();
        let poster = HeldPoster::new(Err("timeout"));
        let outbox = held_outbox(&poster, &db);

        let timed_out = tokio::time::timeout(
            Duration::from_millis(100),
            outbox.submit(name("t3_abc"), name("t1_parent"), "hello".into()),
        )
        .await;
        assert!(timed_out.is_err());

        let mut failed = outbox.stream_failed();
        poster.release.notify_one();

        let recorded = first_non_empty(&mut failed).await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].body, "hello");
        assert!(outbox
            .list_pending_or_posted(&name("t3_abc"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn resend_is_refused_while_delivery_is_in_flight() {
        let db = Db::new("sqlite::memory:").await.unwrap();
        let poster = HeldPoster::new(Ok("xyz"));
        let outbox = held_outbox(&poster, &db);
        let mut live = outbox.stream_pending_or_posted(name("t3_abc"));

        let submitting = tokio::spawn({
            let outbox = outbox.clone();
            async move {
                outbox
                    .submit(name("t3_abc"), name("t1_parent"), "hello".into())
                    .await
            }
        });
        let posting = first_non_empty(&mut live).await.remove(0);
        assert_eq!(posting.state, ReplyState::Posting);

        let err = outbox.resend(posting.clone()).await.unwrap_err();
        assert!(matches!(err, OutboxError::InFlight(key) if key == posting.key()));

        poster.release.notify_one();
        let posted = submitting.await.unwrap().unwrap();
        assert_eq!(posted.key(), posting.key());
        assert_eq!(posted.state, ReplyState::Posted);
        assert_eq!(poster.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn orphaned_posting_row_can_be_resent() {
        let (db, poster, outbox) = outbox(vec![Ok("xyz")]).await;
        let orphan = PendingSyncReply::posting(
            "left behind".into(),
            name("t3_abc"),
            name("t1_parent"),
            "ferris".into(),
            1_000,
        )
        .unwrap();
        db.upsert_pending_reply(&orphan).await.unwrap();

        let posted = outbox.resend(orphan.clone()).await.unwrap();

        assert_eq!(posted.key(), orphan.key());
        assert_eq!(posted.posted_id, Some(name("t1_xyz")));
        assert_eq!(poster.calls(), 1);
    }

    #[tokio::test]
    async fn resend_checks_the_stored_state() {
        let (db, poster, outbox) = outbox(vec![Ok("again")]).await;
        let stale_copy = failed_reply("t1_parent", 1_000);
        db.upsert_pending_reply(&stale_copy.clone().into_posted(name("t1_xyz")))
            .await
            .unwrap();

        let err = outbox.resend(stale_copy).await.unwrap_err();

        assert!(matches!(err, OutboxError::AlreadyPosted(_)));
        assert_eq!(poster.calls(), 0);
    }

    #[tokio::test]
    async fn same_millisecond_submits_keep_separate_rows() {
        let (db, _poster, outbox) = outbox(vec![Ok("one"), Ok("two")]).await;

        let first = outbox
            .submit_at(name("t3_abc"), name("t1_parent"), "first".into(), 42)
            .await
            .unwrap();
        let second = outbox
            .submit_at(name("t3_abc"), name("t1_parent"), "second".into(), 42)
            .await
            .unwrap();

        assert_eq!(first.created_at_millis, 42);
        assert_eq!(second.created_at_millis, 43);
        let stored = db.list_in_flight_replies(&name("t3_abc")).await.unwrap();
        assert_eq!(stored, vec![first, second]);
        assert_eq!(stored[0].body, "first");
        assert_eq!(stored[0].posted_id, Some(name("t1_one")));
        assert_eq!(stored[1].body, "second");
        assert_eq!(stored[1].posted_id, Some(name("t1_two")));
    }
}
