use crate::db::ConfessionStatus;
use crate::prelude::*;
use crate::util::DynError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing_error::SpanTrace;

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Macro to reduce the boilerplate of creating crate-level errors.
/// It directly accepts the body of an error variant without type name
/// qualification. It also automatically calls [`Into`] conversion for each
/// passed field.
macro_rules! err {
    (@val $variant_ident:ident $field_val:expr) => ($field_val);
    (@val $variant_ident:ident) => ($variant_ident);
    ($variant_path:path $({
        $( $field_ident:ident $(: $field_val:expr)? ),*
        $(,)?
    })?) => {{
        use $variant_path as Variant;

        $crate::error::Error::from(
            Variant $({$(
                $field_ident: ::std::convert::Into::into(
                    $crate::error::err!(@val $field_ident $($field_val)?)
                )
            ),*})?
        )
    }};
}

/// Shortcut for defining `map_err` closures that automatically forwards
/// `source` error to the variant.
macro_rules! err_ctx {
    ($variant_path:path $({ $($variant_fields:tt)* })?) => {
        |source| $crate::error::err!($variant_path { source, $($($variant_fields)*)? })
    };
}

/// Creates an [`ErrorKind::Fatal`] error with the given formatting string
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::error::err!($crate::error::ErrorKind::Fatal {
            message: format!($($arg)*),
            source: None,
        })
    };
}

pub(crate) use err;
pub(crate) use err_ctx;
#[allow(unused_imports)]
pub(crate) use fatal;

/// Describes any possible error that may happen in the application lifetime.
#[derive(Clone)]
pub struct Error {
    imp: Arc<ErrorImp>,
}

struct ErrorImp {
    /// Small identifier used for debugging purposes.
    /// It is mentioned in the chat when the error happens.
    /// This way we as developers can copy it and lookup the logs using this id.
    id: String,
    kind: ErrorKind,

    // Participates only in debug impl
    #[allow(dead_code)]
    spantrace: SpanTrace,
}

#[derive(Error, Debug)]
pub(crate) enum ErrorKind {
    #[error(transparent)]
    User {
        #[from]
        source: UserError,
    },

    #[error(transparent)]
    Db {
        #[from]
        source: crate::db::DbError,
    },

    #[error(transparent)]
    Tg {
        #[from]
        source: teloxide::RequestError,
    },

    /// Unrecoverable kind of error, that is not supposed to happen, but when
    /// it happens we can't do anything reasonable about it, so no structural
    /// error handling is possible, this error is just propagated to the top.
    #[error("FATAL: {message}")]
    Fatal {
        message: String,
        source: Option<Box<DynError>>,
    },
}

impl From<sqlx::Error> for ErrorKind {
    fn from(source: sqlx::Error) -> Self {
        Self::Db {
            source: crate::db::DbError::Query { source },
        }
    }
}

/// Errors caused by the input of a human. They are rendered back to the chat
/// verbatim, in contrast to internal errors which reveal only the error id.
#[derive(Error, Debug)]
pub(crate) enum UserError {
    #[error(
        "The confession is too long: {actual_len} characters, \
        while at most {max_len} are allowed"
    )]
    ConfessionTooLong { actual_len: usize, max_len: usize },

    #[error(
        "The comment is too long: {actual_len} characters, \
        while at most {max_len} are allowed"
    )]
    CommentTooLong { actual_len: usize, max_len: usize },

    #[error(
        "The feedback message is too long: {actual_len} characters, \
        while at most {max_len} are allowed"
    )]
    FeedbackTooLong { actual_len: usize, max_len: usize },

    #[error("Confession {confession_id} was not found, check the ID")]
    ConfessionNotFound { confession_id: i64 },

    #[error("Comment {comment_id} was not found, check the ID")]
    CommentNotFound { comment_id: i64 },

    #[error("Feedback entry {feedback_id} was not found, check the ID")]
    FeedbackNotFound { feedback_id: i64 },

    #[error("User {tg_id} is not registered with the bot")]
    UserNotFound { tg_id: i64 },

    #[error("Comments are allowed only on approved confessions")]
    ConfessionNotApproved { confession_id: i64 },

    #[error("The parent comment belongs to a different confession")]
    ParentCommentMismatch {
        parent_comment_id: i64,
        confession_id: i64,
    },

    #[error(
        "Confession {confession_id} was already {status} by {reviewed_by}, \
        nothing to do"
    )]
    AlreadyReviewed {
        confession_id: i64,
        status: ConfessionStatus,
        reviewed_by: String,
    },

    #[error("Expected a numeric ID argument, for example: /comments 42")]
    InvalidIdArgument,

    #[error("You are not allowed to perform this action")]
    AccessDenied,
}

impl Error {
    pub(crate) fn id(&self) -> &str {
        &self.imp.id
    }

    pub(crate) fn kind(&self) -> &ErrorKind {
        &self.imp.kind
    }

    /// Errors caused by interaction with the user.
    /// These are most likely caused by humanz sending wrong input.
    pub(crate) fn is_user_error(&self) -> bool {
        match &self.imp.kind {
            ErrorKind::User { .. } => true,
            ErrorKind::Db { .. } | ErrorKind::Tg { .. } | ErrorKind::Fatal { .. } => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error (id: {}): {}", self.imp.id, self.imp.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.imp.kind.source()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)?;
        fmt::Display::fmt(&self.imp.spantrace, f)
    }
}

impl<T: Into<ErrorKind>> From<T> for Error {
    #[track_caller]
    fn from(kind: T) -> Self {
        let imp = ErrorImp {
            kind: kind.into(),
            id: nanoid::nanoid!(6),
            spantrace: SpanTrace::capture(),
        };

        let err = Self { imp: Arc::new(imp) };

        trace!(err = tracing_err(&err), "Created an error");

        err
    }
}
