use crate::db::{FeedbackStatus, ReactionKind};
use std::str::FromStr;

/// Payload of every inline keyboard button the bot sends.
///
/// Telegram caps `callback_data` at 64 bytes, so the wire format is a
/// terse `kind:args` string rather than serialized JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallbackData {
    /// Admin verdict buttons under a pending confession.
    Approve { confession_id: i64 },
    Reject { confession_id: i64 },

    /// Confession draft confirmation in PM.
    ConfirmConfession,
    DiscardConfession,

    /// "View comments" button under a published confession.
    ViewComments { confession_id: i64 },
    CommentsPage { confession_id: i64, page: i64 },
    AddComment { confession_id: i64 },
    ReplyTo { comment_id: i64 },

    React {
        comment_id: i64,
        kind: ReactionKind,
    },

    ToggleAnonymity,

    /// Feedback triage buttons in the admin queue.
    SetFeedbackStatus {
        feedback_id: i64,
        status: FeedbackStatus,
    },
}

impl CallbackData {
    pub(crate) fn encode(self) -> String {
        match self {
            Self::Approve { confession_id } => format!("ap:{confession_id}"),
            Self::Reject { confession_id } => format!("rj:{confession_id}"),
            Self::ConfirmConfession => "cf".to_owned(),
            Self::DiscardConfession => "dc".to_owned(),
            Self::ViewComments { confession_id } => format!("vc:{confession_id}"),
            Self::CommentsPage {
                confession_id,
                page,
            } => format!("pg:{confession_id}:{page}"),
            Self::AddComment { confession_id } => format!("ac:{confession_id}"),
            Self::ReplyTo { comment_id } => format!("rp:{comment_id}"),
            Self::React { comment_id, kind } => format!("re:{comment_id}:{kind}"),
            Self::ToggleAnonymity => "an".to_owned(),
            Self::SetFeedbackStatus {
                feedback_id,
                status,
            } => format!("fb:{feedback_id}:{status}"),
        }
    }

    /// Stale or foreign payloads decode to `None` and are ignored upstream.
    pub(crate) fn decode(input: &str) -> Option<Self> {
        fn int(part: Option<&str>) -> Option<i64> {
            part?.parse().ok()
        }

        let mut parts = input.splitn(3, ':');
        let kind = parts.next()?;

        let decoded = match kind {
            "ap" => Self::Approve {
                confession_id: int(parts.next())?,
            },
            "rj" => Self::Reject {
                confession_id: int(parts.next())?,
            },
            "cf" => Self::ConfirmConfession,
            "dc" => Self::DiscardConfession,
            "vc" => Self::ViewComments {
                confession_id: int(parts.next())?,
            },
            "pg" => Self::CommentsPage {
                confession_id: int(parts.next())?,
                page: int(parts.next())?,
            },
            "ac" => Self::AddComment {
                confession_id: int(parts.next())?,
            },
            "rp" => Self::ReplyTo {
                comment_id: int(parts.next())?,
            },
            "re" => Self::React {
                comment_id: int(parts.next())?,
                kind: ReactionKind::from_str(parts.next()?).ok()?,
            },
            "an" => Self::ToggleAnonymity,
            "fb" => Self::SetFeedbackStatus {
                feedback_id: int(parts.next())?,
                status: FeedbackStatus::from_str(parts.next()?).ok()?,
            },
            _ => return None,
        };

        // Trailing garbage means the payload is not ours
        if parts.next().is_some() {
            return None;
        }

        Some(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_round_trips() {
        let samples = [
            CallbackData::Approve { confession_id: 42 },
            CallbackData::Reject { confession_id: 1 },
            CallbackData::ConfirmConfession,
            CallbackData::DiscardConfession,
            CallbackData::ViewComments { confession_id: 7 },
            CallbackData::CommentsPage {
                confession_id: 7,
                page: 3,
            },
            CallbackData::AddComment { confession_id: 7 },
            CallbackData::ReplyTo { comment_id: 19 },
            CallbackData::React {
                comment_id: 19,
                kind: ReactionKind::Dislike,
            },
            CallbackData::ToggleAnonymity,
            CallbackData::SetFeedbackStatus {
                feedback_id: 5,
                status: FeedbackStatus::Resolved,
            },
        ];

        for sample in samples {
            let encoded = sample.encode();
            assert!(encoded.len() <= 64, "payload too long: {encoded}");
            assert_eq!(CallbackData::decode(&encoded), Some(sample), "{encoded}");
        }
    }

    #[test]
    fn garbage_decodes_to_none() {
        for garbage in ["", "zz", "ap", "ap:abc", "re:1:hug", "cf:1", "pg:1", "ap:1:2"] {
            assert_eq!(CallbackData::decode(garbage), None, "{garbage}");
        }
    }
}
