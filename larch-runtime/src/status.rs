//! Status codes, runtime errors, and the loop control channel.
//!
//! Every fallible runtime operation reports through one signed channel:
//! zero is success and each negative value names a failure kind, with two
//! reserved codes that are not failures at all but loop `break` and
//! `continue` requests. The codes are part of the ABI that generated code
//! compiles against and must never be renumbered.

use thiserror::Error;

/// The fixed ABI status codes.
///
/// Zero is success. The block from [`FAILURE`][`code::FAILURE`] down holds
/// the built-in failure kinds, [`BREAK`][`code::BREAK`] and
/// [`CONTINUE`][`code::CONTINUE`] are control-only, and everything at
/// [`USER`][`code::USER`] or below belongs to compiler-allocated
/// exception tags.
#[allow(missing_docs)]
pub mod code
{
    pub const OK: i32 = 0;
    pub const FAILURE: i32 = -1;
    pub const ASSERT: i32 = -2;
    pub const NOT_FOUND: i32 = -3;
    pub const OUT_OF_MEM: i32 = -4;
    pub const OUT_OF_RANGE: i32 = -5;
    pub const DIV_BY_ZERO: i32 = -6;
    pub const SIZE_MISMATCH: i32 = -7;
    pub const TYPE_MISMATCH: i32 = -8;
    pub const DIM: i32 = -9;
    pub const SIZE: i32 = -10;
    pub const FILE_OPEN: i32 = -11;
    pub const NULL_FILE: i32 = -12;
    pub const IO: i32 = -13;
    pub const NO_MATCH: i32 = -14;
    pub const BREAK: i32 = -15;
    pub const CONTINUE: i32 = -16;
    pub const NULL_PTR: i32 = -17;
    pub const ZERO_STEP: i32 = -18;
    pub const BAD_ENCODING: i32 = -19;
    pub const NULL_LIST: i32 = -20;
    pub const NO_OPTION: i32 = -21;

    /// First tag available to user-defined exceptions; they grow downward.
    pub const USER: i32 = -1024;
}

/// Result from a fallible runtime operation.
pub type Result<T> =
    std::result::Result<T, Error>;

/// A runtime-detected failure or a language-level exception tag.
///
/// The two control-only codes have no variant here; they live in
/// [`Signal`] and must be cleared by their owning loop before a value of
/// this type is ever formed from them.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum Error
{
    #[error("Failure")]
    Failure,

    #[error("Assertion failed")]
    Assert,

    #[error("Not found")]
    NotFound,

    #[error("Out of memory")]
    OutOfMem,

    #[error("Index out of range")]
    OutOfRange,

    #[error("Division by zero")]
    DivByZero,

    #[error("Size mismatch")]
    SizeMismatch,

    #[error("Type mismatch")]
    TypeMismatch,

    #[error("Invalid dimensionality")]
    Dim,

    #[error("Invalid size")]
    Size,

    #[error("Cannot open file")]
    FileOpen,

    #[error("File is closed")]
    NullFile,

    #[error("I/O error")]
    Io,

    #[error("No match")]
    NoMatch,

    #[error("Null pointer")]
    NullPtr,

    #[error("Zero step")]
    ZeroStep,

    #[error("Malformed encoding")]
    BadEncoding,

    #[error("Empty list")]
    NullList,

    #[error("Empty option")]
    NoOption,

    /// A compiler-allocated exception tag at or below [`code::USER`].
    #[error("User exception {0}")]
    User(i32),
}

impl Error
{
    /// The ABI status code for this error.
    pub fn code(self) -> i32
    {
        match self {
            Self::Failure      => code::FAILURE,
            Self::Assert       => code::ASSERT,
            Self::NotFound     => code::NOT_FOUND,
            Self::OutOfMem     => code::OUT_OF_MEM,
            Self::OutOfRange   => code::OUT_OF_RANGE,
            Self::DivByZero    => code::DIV_BY_ZERO,
            Self::SizeMismatch => code::SIZE_MISMATCH,
            Self::TypeMismatch => code::TYPE_MISMATCH,
            Self::Dim          => code::DIM,
            Self::Size         => code::SIZE,
            Self::FileOpen     => code::FILE_OPEN,
            Self::NullFile     => code::NULL_FILE,
            Self::Io           => code::IO,
            Self::NoMatch      => code::NO_MATCH,
            Self::NullPtr      => code::NULL_PTR,
            Self::ZeroStep     => code::ZERO_STEP,
            Self::BadEncoding  => code::BAD_ENCODING,
            Self::NullList     => code::NULL_LIST,
            Self::NoOption     => code::NO_OPTION,
            Self::User(tag)    => tag,
        }
    }

    /// The error for a failure status code.
    ///
    /// Returns [`None`] for success codes and for the two control-only
    /// codes, which belong to [`Signal`]. Reserved-but-unassigned negative
    /// codes report as [`Failure`][`Self::Failure`].
    pub fn from_code(code: i32) -> Option<Self>
    {
        match code {
            code::FAILURE       => Some(Self::Failure),
            code::ASSERT        => Some(Self::Assert),
            code::NOT_FOUND     => Some(Self::NotFound),
            code::OUT_OF_MEM    => Some(Self::OutOfMem),
            code::OUT_OF_RANGE  => Some(Self::OutOfRange),
            code::DIV_BY_ZERO   => Some(Self::DivByZero),
            code::SIZE_MISMATCH => Some(Self::SizeMismatch),
            code::TYPE_MISMATCH => Some(Self::TypeMismatch),
            code::DIM           => Some(Self::Dim),
            code::SIZE          => Some(Self::Size),
            code::FILE_OPEN     => Some(Self::FileOpen),
            code::NULL_FILE     => Some(Self::NullFile),
            code::IO            => Some(Self::Io),
            code::NO_MATCH      => Some(Self::NoMatch),
            code::NULL_PTR      => Some(Self::NullPtr),
            code::ZERO_STEP     => Some(Self::ZeroStep),
            code::BAD_ENCODING  => Some(Self::BadEncoding),
            code::NULL_LIST     => Some(Self::NullList),
            code::NO_OPTION     => Some(Self::NoOption),
            code::BREAK | code::CONTINUE => None,
            c if c <= code::USER => Some(Self::User(c)),
            c if c < 0 => Some(Self::Failure),
            _ => None,
        }
    }
}

/* -------------------------------------------------------------------------- */
/*                                The loop channel                            */
/* -------------------------------------------------------------------------- */

/// Result of evaluating one loop body.
///
/// This is the four-outcome type the translation of a generated loop
/// consumes: a value, a break request, a continue request, or a failure.
pub type Flow<T> =
    std::result::Result<T, Signal>;

/// Why a loop body stopped early.
///
/// `Break` and `Continue` are requests to the *innermost enclosing loop*
/// and must be intercepted there; letting one escape its owning loop is a
/// defect in the generated code, not a runtime condition. `Raise` carries
/// a real failure and passes through loops untouched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Signal
{
    /// Exit the innermost enclosing loop.
    Break,

    /// Advance the innermost enclosing loop to its next iteration.
    Continue,

    /// A runtime failure or language-level exception; propagates.
    Raise(Error),
}

impl Signal
{
    /// The ABI status code for this signal.
    pub fn code(self) -> i32
    {
        match self {
            Self::Break      => code::BREAK,
            Self::Continue   => code::CONTINUE,
            Self::Raise(err) => err.code(),
        }
    }

    /// The signal for a non-success status code.
    ///
    /// Returns [`None`] for success codes.
    pub fn from_code(code: i32) -> Option<Self>
    {
        match code {
            code::BREAK    => Some(Self::Break),
            code::CONTINUE => Some(Self::Continue),
            _              => Error::from_code(code).map(Self::Raise),
        }
    }
}

impl From<Error> for Signal
{
    fn from(err: Error) -> Self
    {
        Self::Raise(err)
    }
}

/// Drive one loop over `iter`, intercepting break and continue.
///
/// This is the interception contract every generated loop follows:
/// `Break` and `Continue` are cleared to the corresponding control action
/// here and never observed by the caller, while `Raise` aborts the loop
/// and propagates its error unchanged.
pub fn for_each<I, F>(iter: I, mut body: F) -> Result<()>
    where I: IntoIterator, F: FnMut(I::Item) -> Flow<()>
{
    for item in iter {
        match body(item) {
            Ok(())                    => (),
            Err(Signal::Continue)     => continue,
            Err(Signal::Break)        => break,
            Err(Signal::Raise(err))   => return Err(err),
        }
    }
    Ok(())
}

/// Trip count of a counted loop from `first` to `limit` by `step`.
///
/// A zero step is a [`ZeroStep`][`Error::ZeroStep`] failure; an already
/// exhausted range counts as zero rather than negative.
pub fn loop_count(first: isize, limit: isize, step: isize) -> Result<isize>
{
    if step == 0 {
        return Err(Error::ZeroStep);
    }
    let count = if step > 0 {
        (limit - first + step - 1) / step
    } else {
        (first - limit - step - 1) / -step
    };
    Ok(count.max(0))
}
