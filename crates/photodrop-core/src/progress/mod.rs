//! 上传进度跟踪
//!
//! 以会话 ID 为键保存每次上传请求的进度，供客户端轮询。
//! 会话 ID 由 HTTP 层提供，这里只把它当作查找键。
//!
//! 所有状态在一把 `Mutex` 后面，同一会话的并发更新因此是串行的：
//! 每个文件槽位只会被计数一次，`completed` 单调不减且不超过 `total`。

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use crate::error::{Error, Result};
use crate::storage::FileOutcome;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// 会话进度快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: String,
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub done: bool,
    /// 按文件序号排列，尚未完成的为 `null`
    pub files: Vec<Option<FileOutcome>>,
}

impl SessionStatus {
    /// 获取进度百分比
    pub fn progress_percent(&self) -> f32 {
        if self.total > 0 {
            (self.completed as f32 / self.total as f32) * 100.0
        } else {
            0.0
        }
    }
}

/// 单个会话最多跟踪的文件数
pub const MAX_SESSION_FILES: usize = 10_000;

struct SessionEntry {
    files: Vec<Option<FileOutcome>>,
    completed: usize,
    /// 请求体已读完，不会再有新文件
    settled: bool,
    last_update: Instant,
}

impl SessionEntry {
    fn snapshot(&self, session_id: &str) -> SessionStatus {
        let succeeded = self.files.iter().flatten().filter(|o| o.success).count();
        SessionStatus {
            session_id: session_id.to_string(),
            total: self.files.len(),
            completed: self.completed,
            succeeded,
            failed: self.completed - succeeded,
            done: self.settled && self.completed == self.files.len(),
            files: self.files.clone(),
        }
    }
}

/// 进度跟踪器
pub struct ProgressTracker<C: Clock = SystemClock> {
    clock: C,
    idle_ttl: Duration,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl ProgressTracker<SystemClock> {
    pub fn new(idle_ttl: Duration) -> Self {
        Self::with_clock(idle_ttl, SystemClock)
    }
}

impl<C: Clock> ProgressTracker<C> {
    pub fn with_clock(idle_ttl: Duration, clock: C) -> Self {
        Self {
            clock,
            idle_ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 开始一个会话；同 ID 的旧会话会被重置
    ///
    /// `total` 来自客户端，超过 [`MAX_SESSION_FILES`] 时拒绝。
    pub fn begin(&self, session_id: &str, total: usize) -> Result<()> {
        if total > MAX_SESSION_FILES {
            return Err(Error::InvalidPayload(format!(
                "too many files declared: {total} (limit {MAX_SESSION_FILES})"
            )));
        }
        self.evict_idle();
        let now = self.clock.now();
        self.lock().insert(
            session_id.to_string(),
            SessionEntry {
                files: vec![None; total],
                completed: 0,
                settled: false,
                last_update: now,
            },
        );
        debug!("Upload session {} started with {} files", session_id, total);
        Ok(())
    }

    /// 追加预期文件数（客户端没有预先声明数量时逐个追加），返回新的总数
    pub fn grow(&self, session_id: &str, additional: usize) -> Result<usize> {
        let now = self.clock.now();
        let mut sessions = self.lock();
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        let total = entry.files.len().saturating_add(additional);
        if total > MAX_SESSION_FILES {
            return Err(Error::InvalidPayload(format!(
                "too many files in one session (limit {MAX_SESSION_FILES})"
            )));
        }
        entry
            .files
            .extend(std::iter::repeat_n(None, additional));
        entry.settled = false;
        entry.last_update = now;
        Ok(entry.files.len())
    }

    /// 记录第 `index` 个文件的结果
    ///
    /// 同一序号重复记录只替换结果，不重复计数。
    pub fn mark_completed(&self, session_id: &str, index: usize, outcome: FileOutcome) -> Result<()> {
        let now = self.clock.now();
        let mut sessions = self.lock();
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let total = entry.files.len();
        let slot = entry
            .files
            .get_mut(index)
            .ok_or(Error::FileIndexOutOfRange { index, total })?;
        if slot.is_none() {
            entry.completed += 1;
        }
        *slot = Some(outcome);
        entry.last_update = now;
        Ok(())
    }

    /// 请求结束时收尾：丢弃从未到达的尾部槽位，返回最终进度
    ///
    /// 客户端预先声明的数量可能多于实际发送的文件。
    pub fn settle(&self, session_id: &str) -> Result<SessionStatus> {
        let now = self.clock.now();
        let mut sessions = self.lock();
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        while matches!(entry.files.last(), Some(None)) {
            entry.files.pop();
        }
        entry.settled = true;
        entry.last_update = now;
        Ok(entry.snapshot(session_id))
    }

    /// 查询会话进度
    pub fn status(&self, session_id: &str) -> Result<SessionStatus> {
        self.lock()
            .get(session_id)
            .map(|entry| entry.snapshot(session_id))
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    /// 所有会话的快照，最近更新的在前
    pub fn sessions(&self) -> Vec<SessionStatus> {
        let sessions = self.lock();
        let mut entries: Vec<_> = sessions.iter().collect();
        entries.sort_by(|a, b| b.1.last_update.cmp(&a.1.last_update));
        entries
            .into_iter()
            .map(|(id, entry)| entry.snapshot(id))
            .collect()
    }

    /// 清理超过空闲时长没有更新的会话，返回清理数量
    pub fn evict_idle(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| now.saturating_duration_since(entry.last_update) <= self.idle_ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!("Evicted {} idle upload sessions", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// 在后台周期性清理空闲会话
pub fn spawn_sweeper<C: Clock>(tracker: Arc<ProgressTracker<C>>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            tracker.evict_idle();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(name: &str) -> FileOutcome {
        FileOutcome::stored(name, name.to_string(), 3)
    }

    fn failed(name: &str) -> FileOutcome {
        FileOutcome::failed(name, &Error::InvalidPayload("empty payload".into()))
    }

    fn tracker() -> (Arc<ManualClock>, ProgressTracker<Arc<ManualClock>>) {
        let clock = Arc::new(ManualClock::new());
        let tracker = ProgressTracker::with_clock(Duration::from_secs(60), clock.clone());
        (clock, tracker)
    }

    #[test]
    fn test_unknown_session() {
        let (_, tracker) = tracker();
        assert!(matches!(
            tracker.status("nope"),
            Err(Error::SessionNotFound(id)) if id == "nope"
        ));
        assert!(tracker.mark_completed("nope", 0, ok("a")).is_err());
        assert!(tracker.grow("nope", 1).is_err());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let (_, tracker) = tracker();
        tracker.begin("s1", 3).unwrap();

        let mut last = 0;
        for (i, outcome) in [ok("a"), failed("b"), ok("c")].into_iter().enumerate() {
            tracker.mark_completed("s1", i, outcome).unwrap();
            let status = tracker.status("s1").unwrap();
            assert!(status.completed >= last);
            assert!(status.completed <= status.total);
            last = status.completed;
        }

        assert!(!tracker.status("s1").unwrap().done);
        let status = tracker.settle("s1").unwrap();
        assert_eq!(status.completed, status.total);
        assert_eq!(status.succeeded, 2);
        assert_eq!(status.failed, 1);
        assert!(status.done);
        assert_eq!(status.progress_percent(), 100.0);
    }

    #[test]
    fn test_repeated_mark_not_double_counted() {
        let (_, tracker) = tracker();
        tracker.begin("s1", 2).unwrap();
        tracker.mark_completed("s1", 0, failed("a")).unwrap();
        tracker.mark_completed("s1", 0, ok("a")).unwrap();

        let status = tracker.status("s1").unwrap();
        assert_eq!(status.completed, 1);
        assert_eq!(status.succeeded, 1);
        assert!(!status.done);
        assert!(status.files[1].is_none());
    }

    #[test]
    fn test_index_out_of_range() {
        let (_, tracker) = tracker();
        tracker.begin("s1", 1).unwrap();
        assert!(matches!(
            tracker.mark_completed("s1", 1, ok("x")),
            Err(Error::FileIndexOutOfRange { index: 1, total: 1 })
        ));
    }

    #[test]
    fn test_grow() {
        let (_, tracker) = tracker();
        tracker.begin("s1", 0).unwrap();
        assert!(!tracker.status("s1").unwrap().done);

        assert_eq!(tracker.grow("s1", 1).unwrap(), 1);
        tracker.mark_completed("s1", 0, ok("a")).unwrap();
        assert_eq!(tracker.grow("s1", 1).unwrap(), 2);

        let status = tracker.status("s1").unwrap();
        assert_eq!((status.completed, status.total), (1, 2));
    }

    /// 两次 grow 之间轮询：已到达的文件都处理完了，但请求体还没读完
    #[test]
    fn test_not_done_between_grows() {
        let (_, tracker) = tracker();
        tracker.begin("s1", 0).unwrap();

        tracker.grow("s1", 1).unwrap();
        tracker.mark_completed("s1", 0, ok("a")).unwrap();
        let status = tracker.status("s1").unwrap();
        assert_eq!((status.completed, status.total), (1, 1));
        assert!(!status.done);

        tracker.grow("s1", 1).unwrap();
        tracker.mark_completed("s1", 1, ok("b")).unwrap();
        assert!(!tracker.status("s1").unwrap().done);

        let status = tracker.settle("s1").unwrap();
        assert_eq!((status.completed, status.total), (2, 2));
        assert!(status.done);
    }

    #[test]
    fn test_declared_total_is_bounded() {
        let (_, tracker) = tracker();
        assert!(matches!(
            tracker.begin("s1", usize::MAX),
            Err(Error::InvalidPayload(_))
        ));
        assert!(tracker.status("s1").is_err());

        tracker.begin("s1", MAX_SESSION_FILES).unwrap();
        assert!(tracker.grow("s1", 1).is_err());
        assert_eq!(tracker.status("s1").unwrap().total, MAX_SESSION_FILES);
    }

    #[test]
    fn test_settle_drops_missing_tail() {
        let (_, tracker) = tracker();
        tracker.begin("s1", 4).unwrap();
        tracker.mark_completed("s1", 0, ok("a")).unwrap();
        tracker.mark_completed("s1", 1, failed("b")).unwrap();

        let status = tracker.settle("s1").unwrap();
        assert_eq!((status.completed, status.total), (2, 2));
        assert!(status.done);
        assert_eq!(tracker.status("s1").unwrap(), status);
    }

    #[test]
    fn test_begin_resets() {
        let (_, tracker) = tracker();
        tracker.begin("s1", 1).unwrap();
        tracker.mark_completed("s1", 0, ok("a")).unwrap();
        tracker.begin("s1", 2).unwrap();

        let status = tracker.status("s1").unwrap();
        assert_eq!((status.completed, status.total), (0, 2));
    }

    #[test]
    fn test_idle_eviction() {
        let (clock, tracker) = tracker();
        tracker.begin("old", 1).unwrap();
        clock.advance(Duration::from_secs(45));
        tracker.begin("fresh", 1).unwrap();

        clock.advance(Duration::from_secs(30));
        // old: 75s 无更新，fresh: 30s
        assert_eq!(tracker.evict_idle(), 1);
        assert!(tracker.status("old").is_err());
        assert!(tracker.status("fresh").is_ok());

        // 更新会刷新时间
        clock.advance(Duration::from_secs(50));
        tracker.mark_completed("fresh", 0, ok("a")).unwrap();
        clock.advance(Duration::from_secs(50));
        assert_eq!(tracker.evict_idle(), 0);

        clock.advance(Duration::from_secs(11));
        assert_eq!(tracker.evict_idle(), 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_sessions_most_recent_first() {
        let (clock, tracker) = tracker();
        tracker.begin("a", 1).unwrap();
        clock.advance(Duration::from_secs(1));
        tracker.begin("b", 1).unwrap();

        let ids: Vec<_> = tracker
            .sessions()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn test_concurrent_marks() {
        use std::thread;

        let tracker = Arc::new(ProgressTracker::new(Duration::from_secs(60)));
        tracker.begin("s1", 100).unwrap();

        let mut handles = vec![];
        for t in 0..4 {
            let tracker = Arc::clone(&tracker);
            handles.push(thread::spawn(move || {
                // 每个线程都标记全部序号，模拟重复回调
                for i in 0..100 {
                    tracker
                        .mark_completed("s1", (i + t * 25) % 100, ok("f"))
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let status = tracker.settle("s1").unwrap();
        assert_eq!(status.completed, 100);
        assert!(status.done);
    }
}
