//! Assorted utility functions (missing batteries).
mod std_ext;
mod teloxide_ext;

pub(crate) type DynError = dyn std::error::Error + Send + Sync;
pub(crate) type DynResult<T = ()> = std::result::Result<T, Box<DynError>>;

// We don't care if some of the imports here are not used. They may be used
// at some point. It's just convenient not to import them manually all the
// time a new logging macro is needed.
#[allow(unused_imports)]
pub(crate) mod prelude {
    pub(crate) use super::std_ext::ErrorExt as _;
    pub(crate) use super::teloxide_ext::UserExt as _;
    pub(crate) use super::teloxide_ext::UtilRequesterExt as _;

    pub(crate) use super::tracing_err;
    pub(crate) use tracing::{
        debug, debug_span, error, error_span, info, info_span, instrument, trace, trace_span,
        warn, warn_span, Instrument as _,
    };
}

#[must_use]
pub fn tracing_err<'a, E: std::error::Error + 'static>(
    err: &'a E,
) -> impl tracing::Value + std::fmt::Debug + 'a {
    err as &dyn std::error::Error
}
