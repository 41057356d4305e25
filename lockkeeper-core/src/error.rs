use thiserror::Error;

/// Input and timeout errors the core can report back to a caller.
///
/// Programming errors (release of a name that is not held, a signal
/// delivered to a cell that no longer exists) are not represented here —
/// per the core's error model they indicate an invariant violation in the
/// core itself and abort the process (`unreachable!`/`panic!` at the call
/// site) rather than returning a value a caller could swallow. An unknown
/// lease on `unlock` is likewise not an error: it is treated as a
/// successful, idempotent no-op.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("empty lock names")]
    EmptyNames,

    #[error("invalid lock mode {0:?}, must be \"key\" or \"path\"")]
    InvalidMode(String),

    #[error("invalid path, canonicalizes to root")]
    InvalidPath,

    #[error("lock timed out before all names could be acquired")]
    Timeout,
}

pub type LockResult<T> = Result<T, LockError>;
