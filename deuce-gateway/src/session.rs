//! In-memory session store.
//!
//! Each session sits behind its own async mutex. The orchestrator holds that
//! lock for a whole turn, so messages for one session are processed one at a
//! time in arrival order (tokio's mutex is fair) while different sessions
//! never contend.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use deuce_core::config::SessionSettings;
use deuce_core::{ToolInvocationRecord, Turn, TurnRole};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

const TITLE_WORDS: usize = 10;

/// Tool input collected so far while waiting for the user to supply the
/// missing fields.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingClarification {
    pub tool: String,
    pub partial: Map<String, Value>,
}

/// One conversation: a capped, gap-free log of turns.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    turns: VecDeque<Turn>,
    max_turns: usize,
    next_seq: u64,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    title: Option<String>,
    pending: Vec<PendingClarification>,
    /// Latest successful result per tool, kept after its turn is evicted.
    latest_results: BTreeMap<String, ToolInvocationRecord>,
}

impl Session {
    pub fn new(id: impl Into<String>, max_turns: usize, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            turns: VecDeque::new(),
            max_turns: max_turns.max(1),
            next_seq: 1,
            created_at: now,
            last_active: now,
            title: None,
            pending: Vec::new(),
            latest_results: BTreeMap::new(),
        }
    }

    pub fn turns(&self) -> &VecDeque<Turn> {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> Vec<&Turn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).collect()
    }

    /// Text of the user turns among the last `n` turns, oldest first.
    pub fn recent_user_texts(&self, n: usize) -> Vec<String> {
        self.recent(n)
            .into_iter()
            .filter(|turn| turn.role == TurnRole::User)
            .map(Turn::text)
            .collect()
    }

    pub fn last_user_text(&self) -> Option<String> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == TurnRole::User)
            .map(Turn::text)
    }

    /// Append a turn, dropping the oldest ones first when the cap is reached.
    /// Returns the sequence number assigned to the turn.
    pub fn append(&mut self, mut turn: Turn) -> u64 {
        while self.turns.len() >= self.max_turns {
            if let Some(evicted) = self.turns.pop_front() {
                debug!("[session:{}] evicted turn {}", self.id, evicted.seq);
            }
        }

        if self.title.is_none() && turn.role == TurnRole::User {
            self.title = derive_title(&turn.text());
        }
        if let Some(record) = &turn.tool_call
            && record.status.is_success()
        {
            self.latest_results.insert(record.tool.clone(), record.clone());
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        turn.seq = seq;
        self.last_active = turn.created_at.max(self.last_active);
        self.turns.push_back(turn);
        seq
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_active {
            self.last_active = now;
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, idle_timeout: chrono::Duration) -> bool {
        now - self.last_active > idle_timeout
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn pending(&self) -> &[PendingClarification] {
        &self.pending
    }

    pub fn pending_for(&self, tool: &str) -> Option<&PendingClarification> {
        self.pending.iter().find(|p| p.tool == tool)
    }

    pub fn set_pending(&mut self, pending: Vec<PendingClarification>) {
        self.pending = pending;
    }

    /// The user's most recent successful result for each tool, by tool name.
    pub fn latest_results(&self) -> impl Iterator<Item = &ToolInvocationRecord> {
        self.latest_results.values()
    }
}

/// Title-cased first words of the opening message.
fn derive_title(text: &str) -> Option<String> {
    let words: Vec<String> = text
        .split_whitespace()
        .take(TITLE_WORDS)
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}

/// Shared slot for one session id.
///
/// The mutex lives as long as the id stays in the store. A reset or an
/// idle expiry only marks the slot; the next holder of the lock starts from
/// a fresh session, so waiters queued across a reset keep their order.
#[derive(Debug)]
pub struct SessionHandle {
    session: Arc<Mutex<Session>>,
    cleared: AtomicBool,
}

impl SessionHandle {
    fn new(session: Session) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            cleared: AtomicBool::new(false),
        }
    }

    /// Wait for exclusive access. Waiters are served in FIFO order.
    pub async fn lock(&self) -> OwnedMutexGuard<Session> {
        let mut session = Arc::clone(&self.session).lock_owned().await;
        if self.cleared.swap(false, Ordering::SeqCst) {
            debug!("[session:{}] starting from a cleared session", session.id);
            let fresh = Session::new(session.id.clone(), session.max_turns, Utc::now());
            *session = fresh;
        }
        session
    }

    /// True after a reset or expiry, until the next turn takes the lock.
    pub fn is_cleared(&self) -> bool {
        self.cleared.load(Ordering::SeqCst)
    }

    /// Mark for clearing. Returns false when already marked.
    fn clear(&self) -> bool {
        !self.cleared.swap(true, Ordering::SeqCst)
    }

    /// Expired and not currently in use.
    fn idle_expired(&self, now: DateTime<Utc>, idle_timeout: chrono::Duration) -> bool {
        match self.session.try_lock() {
            Ok(session) => session.is_expired(now, idle_timeout),
            // locked means a turn is running
            Err(_) => false,
        }
    }

    /// Nothing worth keeping and nobody waiting: cleared or expired,
    /// unlocked, and referenced only by the store.
    fn evictable(self: &Arc<Self>, now: DateTime<Utc>, idle_timeout: chrono::Duration) -> bool {
        if Arc::strong_count(self) > 1 {
            return false;
        }
        match self.session.try_lock() {
            Ok(session) => self.is_cleared() || session.is_expired(now, idle_timeout),
            Err(_) => false,
        }
    }
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    max_turns: usize,
    idle_timeout: chrono::Duration,
}

impl SessionStore {
    pub fn new(settings: &SessionSettings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns: settings.max_turns,
            idle_timeout: settings.idle_timeout(),
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Handle for `session_id`, creating the session when unknown.
    ///
    /// An idle-expired session is cleared so the caller starts afresh;
    /// callers never see the expiry.
    pub fn get_or_create(&self, session_id: &str, now: DateTime<Utc>) -> Arc<SessionHandle> {
        {
            let sessions = self.sessions.read().expect("SessionStore lock poisoned");
            if let Some(handle) = sessions.get(session_id) {
                if handle.idle_expired(now, self.idle_timeout) && handle.clear() {
                    info!("[session:{}] expired, starting a fresh session", session_id);
                }
                return Arc::clone(handle);
            }
        }

        let mut sessions = self.sessions.write().expect("SessionStore lock poisoned");
        let handle = sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!("[session:{}] created", session_id);
            Arc::new(SessionHandle::new(Session::new(
                session_id,
                self.max_turns,
                now,
            )))
        });
        Arc::clone(handle)
    }

    /// Existing handle, without creating one. Cleared sessions count as
    /// gone.
    pub fn get(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        let sessions = self.sessions.read().expect("SessionStore lock poisoned");
        sessions
            .get(session_id)
            .filter(|handle| !handle.is_cleared())
            .cloned()
    }

    /// Append a turn to `session_id`, waiting behind any turn in progress.
    pub async fn append(&self, session_id: &str, turn: Turn) -> u64 {
        let handle = self.get_or_create(session_id, Utc::now());
        let mut session = handle.lock().await;
        session.append(turn)
    }

    /// Drop a session's history. Returns whether it existed.
    ///
    /// A turn already running finishes against the old history; the next
    /// queued message starts the fresh one.
    pub fn reset(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read().expect("SessionStore lock poisoned");
        match sessions.get(session_id) {
            Some(handle) if handle.clear() => {
                info!("[session:{}] reset", session_id);
                true
            }
            _ => false,
        }
    }

    /// Remove sessions idle for longer than the configured timeout, and
    /// cleared ones nobody is using. Sessions with a turn in progress or a
    /// message waiting are kept.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().expect("SessionStore lock poisoned");
        let before = sessions.len();
        sessions.retain(|id, handle| {
            let evict = handle.evictable(now, self.idle_timeout);
            if evict {
                debug!("[session:{}] evicted", id);
            }
            !evict
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!("Evicted {} idle sessions", evicted);
        }
        evicted
    }

    /// Live sessions, not counting cleared ones.
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .expect("SessionStore lock poisoned")
            .values()
            .filter(|handle| !handle.is_cleared())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn settings(max_turns: usize) -> SessionSettings {
        SessionSettings {
            max_turns,
            idle_timeout_minutes: 30,
            ..Default::default()
        }
    }

    #[test]
    fn append_assigns_contiguous_sequence_numbers() {
        let mut session = Session::new("s", 10, Utc::now());
        assert_eq!(session.append(Turn::user("one")), 1);
        assert_eq!(session.append(Turn::assistant("two", Vec::new())), 2);
        assert_eq!(session.append(Turn::user("three")), 3);
        let seqs: Vec<u64> = session.turns().iter().map(|t| t.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn cap_evicts_oldest_first() {
        let mut session = Session::new("s", 3, Utc::now());
        for i in 0..5 {
            session.append(Turn::user(format!("message {i}")));
        }
        assert_eq!(session.len(), 3);
        let texts: Vec<String> = session.turns().iter().map(Turn::text).collect();
        assert_eq!(texts, vec!["message 2", "message 3", "message 4"]);
        let seqs: Vec<u64> = session.turns().iter().map(|t| t.seq).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[test]
    fn title_comes_from_first_user_message() {
        let mut session = Session::new("s", 10, Utc::now());
        session.append(Turn::user(
            "when will i ovulate if my last period started on the first of may",
        ));
        session.append(Turn::user("something else"));
        assert_eq!(
            session.title(),
            Some("When Will I Ovulate If My Last Period Started On")
        );
    }

    #[test]
    fn recent_user_texts_skip_other_roles() {
        let mut session = Session::new("s", 10, Utc::now());
        session.append(Turn::user("a"));
        session.append(Turn::assistant("b", Vec::new()));
        session.append(Turn::user("c"));
        assert_eq!(session.recent_user_texts(2), vec!["c"]);
        assert_eq!(session.last_user_text().as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn get_or_create_returns_the_same_session() {
        let store = SessionStore::new(&settings(10));
        let now = Utc::now();
        let first = store.get_or_create("abc", now);
        first.lock().await.append(Turn::user("hello"));
        let second = store.get_or_create("abc", now);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn expired_session_starts_fresh_silently() {
        let store = SessionStore::new(&settings(10));
        let start = Utc::now();
        let old = store.get_or_create("abc", start);
        old.lock().await.append(Turn::user("hello"));

        let later = start + Duration::minutes(31);
        let same = store.get_or_create("abc", later);
        assert!(Arc::ptr_eq(&old, &same));
        assert!(same.is_cleared());
        assert!(same.lock().await.is_empty());
        assert!(!same.is_cleared());
    }

    #[tokio::test]
    async fn evict_expired_keeps_active_and_busy_sessions() {
        let store = SessionStore::new(&settings(10));
        let start = Utc::now();
        store.get_or_create("idle", start);
        let busy = store.get_or_create("busy", start);
        store.get_or_create("fresh", start + Duration::minutes(40));

        let _guard = busy.lock().await;
        drop(busy);
        let evicted = store.evict_expired(start + Duration::minutes(45));
        assert_eq!(evicted, 1);
        assert!(store.get("idle").is_none());
        assert!(store.get("busy").is_some());
        assert!(store.get("fresh").is_some());
    }

    #[tokio::test]
    async fn reset_clears_the_session_in_place() {
        let store = SessionStore::new(&settings(10));
        let handle = store.get_or_create("abc", Utc::now());
        handle.lock().await.append(Turn::user("hello"));

        assert!(store.reset("abc"));
        assert!(handle.is_cleared());
        assert!(!store.reset("abc"));
        assert!(store.is_empty());
        assert!(store.get("abc").is_none());

        drop(handle);
        assert_eq!(store.evict_expired(Utc::now()), 1);
        assert!(!store.reset("abc"));
    }

    #[tokio::test]
    async fn waiters_keep_arrival_order_across_a_reset() {
        let store = Arc::new(SessionStore::new(&settings(10)));
        let mut running = store.get_or_create("abc", Utc::now()).lock().await;
        running.append(Turn::user("in flight"));

        let send = |text: &'static str| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let handle = store.get_or_create("abc", Utc::now());
                handle.lock().await.append(Turn::user(text));
            })
        };

        let early = send("queued before reset");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(store.reset("abc"));
        let late = send("sent after reset");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        drop(running);
        early.await.unwrap();
        late.await.unwrap();

        let handle = store.get("abc").unwrap();
        let session = handle.lock().await;
        let texts: Vec<String> = session.turns().iter().map(Turn::text).collect();
        assert_eq!(texts, vec!["queued before reset", "sent after reset"]);
    }

    #[test]
    fn latest_results_outlive_evicted_turns() {
        use deuce_core::{ToolInvocationRecord, ToolStatus};
        use serde_json::json;

        let record = |tool: &str, status: ToolStatus, summary: &str| ToolInvocationRecord {
            tool: tool.to_string(),
            input: json!({}),
            output: status.is_success().then(|| json!({"summary": summary})),
            status,
            error: None,
            elapsed_ms: 1,
        };

        let mut session = Session::new("s", 3, Utc::now());
        session.append(Turn::tool(record("lipid_profile", ToolStatus::Succeeded, "first")));
        session.append(Turn::tool(record("lipid_profile", ToolStatus::Succeeded, "second")));
        session.append(Turn::tool(record("lipid_profile", ToolStatus::Failed, "")));
        for i in 0..5 {
            session.append(Turn::user(format!("message {i}")));
        }

        let latest: Vec<&ToolInvocationRecord> = session.latest_results().collect();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].output, Some(json!({"summary": "second"})));
    }

    #[tokio::test]
    async fn store_append_respects_cap() {
        let store = SessionStore::new(&settings(2));
        for i in 0..4 {
            store.append("abc", Turn::user(format!("m{i}"))).await;
        }
        let handle = store.get("abc").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.len(), 2);
        assert_eq!(session.turns()[0].text(), "m2");
    }
}
