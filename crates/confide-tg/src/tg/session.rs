use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use teloxide::types::UserId;

/// Sessions that received no message for this long are dropped.
const SESSION_TTL: Duration = Duration::from_secs(15 * 60);

/// What the bot is waiting for from a particular user in PM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionState {
    /// `/confess` was issued, the next message is the confession text.
    AwaitingConfession,

    /// The confession text arrived and a confirm/discard keyboard is shown.
    /// The text lives here, nothing is persisted until the user confirms.
    ConfirmingConfession { text: String },

    /// An "add comment"/"reply" button was pressed, the next message is
    /// the comment text.
    AwaitingComment {
        confession_id: i64,
        parent_comment_id: Option<i64>,
    },

    /// `/feedback` was issued, the next message is the feedback text.
    AwaitingFeedback,
}

#[derive(Debug, Clone)]
struct Session {
    state: SessionState,
    expires_at: Instant,
}

/// In-memory conversation state, keyed by the Telegram user. Restarting the
/// bot forgets all sessions, which only costs users a re-typed command.
///
/// Expired entries are swept lazily on every mutation, there is no
/// background task.
#[derive(Default)]
pub(crate) struct SessionStore {
    sessions: Mutex<HashMap<UserId, Session>>,
}

impl SessionStore {
    pub(crate) fn set(&self, user_id: UserId, state: SessionState) {
        self.set_at(user_id, state, Instant::now())
    }

    /// Removes and returns the user's session, if any non-expired one exists.
    pub(crate) fn take(&self, user_id: UserId) -> Option<SessionState> {
        self.take_at(user_id, Instant::now())
    }

    /// Drops the user's session. Returns `true` if there was one to drop.
    pub(crate) fn clear(&self, user_id: UserId) -> bool {
        self.take(user_id).is_some()
    }

    fn set_at(&self, user_id: UserId, state: SessionState, now: Instant) {
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, session| session.expires_at > now);
        sessions.insert(
            user_id,
            Session {
                state,
                expires_at: now + SESSION_TTL,
            },
        );
    }

    fn take_at(&self, user_id: UserId, now: Instant) -> Option<SessionState> {
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, session| session.expires_at > now);
        sessions.remove(&user_id).map(|session| session.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_is_destructive() {
        let store = SessionStore::default();
        let user = UserId(1);

        store.set(user, SessionState::AwaitingConfession);
        assert_eq!(store.take(user), Some(SessionState::AwaitingConfession));
        assert_eq!(store.take(user), None);
    }

    #[test]
    fn sessions_expire_after_the_ttl() {
        let store = SessionStore::default();
        let user = UserId(1);
        let start = Instant::now();

        store.set_at(user, SessionState::AwaitingFeedback, start);
        assert_eq!(
            store.take_at(user, start + SESSION_TTL - Duration::from_secs(1)),
            Some(SessionState::AwaitingFeedback)
        );

        store.set_at(user, SessionState::AwaitingFeedback, start);
        assert_eq!(store.take_at(user, start + SESSION_TTL), None);
    }

    #[test]
    fn a_new_session_replaces_the_old_one() {
        let store = SessionStore::default();
        let user = UserId(1);

        store.set(user, SessionState::AwaitingConfession);
        store.set(user, SessionState::AwaitingFeedback);
        assert_eq!(store.take(user), Some(SessionState::AwaitingFeedback));
    }

    #[test]
    fn expired_sessions_of_other_users_are_swept_on_mutation() {
        let store = SessionStore::default();
        let start = Instant::now();

        store.set_at(UserId(1), SessionState::AwaitingConfession, start);
        store.set_at(
            UserId(2),
            SessionState::AwaitingFeedback,
            start + SESSION_TTL * 2,
        );

        assert_eq!(store.sessions.lock().len(), 1);
    }
}
