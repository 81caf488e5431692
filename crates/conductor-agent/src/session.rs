use std::collections::{HashMap, VecDeque};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::SystemTime;

use conductor_core::{ChatMessage, IgnoreLock as _, SessionConfig};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

/// Per-session conversation state.
///
/// History is a bounded ring buffer: once `max_history_entries` is
/// reached, the oldest turn is evicted for each new one.
pub struct AgentSession {
    /// Caller-chosen session identifier.
    pub session_id: String,
    /// Normalized working directory, always an existing directory.
    pub working_directory: PathBuf,
    /// Bounded conversation history, oldest first.
    pub conversation_history: VecDeque<ChatMessage>,
    /// Session-scoped values exposed to tools and routing.
    pub context_data: HashMap<String, Value>,
    /// When the session was created.
    pub created_at: SystemTime,
    /// When the session last saw a message.
    pub last_activity: SystemTime,
    /// History capacity.
    max_history: usize,
}

impl AgentSession {
    /// Creates a session, normalizing the requested working directory.
    ///
    /// A missing or non-directory path falls back to the process working
    /// directory with a warning; session creation itself never fails.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        working_directory: Option<&Path>,
        config: &SessionConfig,
    ) -> Self {
        let session_id = session_id.into();
        let working_directory = Self::normalize_directory(&session_id, working_directory);
        let now = SystemTime::now();
        Self {
            session_id,
            working_directory,
            conversation_history: VecDeque::new(),
            context_data: HashMap::new(),
            created_at: now,
            last_activity: now,
            max_history: config.max_history_entries,
        }
    }

    /// Appends a turn, evicting the oldest when at capacity.
    pub fn push_message(&mut self, message: ChatMessage) {
        if self.conversation_history.len() >= self.max_history {
            self.conversation_history.pop_front();
        }
        self.conversation_history.push_back(message);
        self.last_activity = SystemTime::now();
    }

    /// The full history as a contiguous slice of turns, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ChatMessage> {
        self.conversation_history.iter().cloned().collect()
    }

    /// Drops all conversation history, keeping session identity and data.
    pub fn clear_history(&mut self) {
        self.conversation_history.clear();
        self.last_activity = SystemTime::now();
    }

    /// Resolves the requested directory, falling back to the process
    /// working directory when it is unusable.
    fn normalize_directory(session_id: &str, requested: Option<&Path>) -> PathBuf {
        if let Some(path) = requested {
            if path.is_dir() {
                return path.to_path_buf();
            }
            warn!(
                session = %session_id,
                path = %path.display(),
                "requested working directory is not a directory, using current"
            );
        }
        env::current_dir().unwrap_or_else(|error| {
            warn!("current directory unavailable: {error}");
            PathBuf::from(".")
        })
    }
}

/// Shared handle to one session, serialized by its own async mutex.
pub type SharedSession = Arc<Mutex<AgentSession>>;

/// In-memory session store.
///
/// Each session sits behind its own `tokio::sync::Mutex`, so concurrent
/// `process_input` calls against the same session id are serialized while
/// distinct sessions proceed in parallel. Sessions live until explicitly
/// deleted.
pub struct SessionStore {
    /// Session configuration applied to new sessions.
    config: SessionConfig,
    /// Sessions keyed by id.
    sessions: StdMutex<HashMap<String, SharedSession>>,
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: StdMutex::new(HashMap::new()),
        }
    }

    /// Fetches a session, creating it on first use.
    #[must_use]
    pub fn get_or_create(
        &self,
        session_id: &str,
        working_directory: Option<&Path>,
    ) -> SharedSession {
        let mut sessions = self.sessions.lock_ignore_poison();
        if let Some(session) = sessions.get(session_id) {
            return Arc::clone(session);
        }
        let session = Arc::new(Mutex::new(AgentSession::new(
            session_id,
            working_directory,
            &self.config,
        )));
        sessions.insert(session_id.to_owned(), Arc::clone(&session));
        session
    }

    /// Deletes a session. Returns `false` when the id is unknown.
    pub fn delete_session(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock_ignore_poison();
        sessions.remove(session_id).is_some()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        let sessions = self.sessions.lock_ignore_poison();
        sessions.len()
    }

    /// Whether the store holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all live sessions, unordered.
    #[must_use]
    pub fn session_ids(&self) -> Vec<String> {
        let sessions = self.sessions.lock_ignore_poison();
        sessions.keys().cloned().collect()
    }
}
