//! Span completion status.

use std::borrow::Cow;

/// The canonical set of status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CanonicalCode {
    /// The operation completed successfully.
    Ok = 0,
    /// The operation was cancelled, typically by the caller.
    Cancelled = 1,
    /// Unknown error.
    Unknown = 2,
    /// The client specified an invalid argument.
    InvalidArgument = 3,
    /// The deadline expired before the operation could complete.
    DeadlineExceeded = 4,
    /// A requested entity was not found.
    NotFound = 5,
    /// The entity that the client attempted to create already exists.
    AlreadyExists = 6,
    /// The caller does not have permission to execute the operation.
    PermissionDenied = 7,
    /// A resource has been exhausted.
    ResourceExhausted = 8,
    /// The system is not in a state required for the operation's execution.
    FailedPrecondition = 9,
    /// The operation was aborted.
    Aborted = 10,
    /// The operation was attempted past the valid range.
    OutOfRange = 11,
    /// The operation is not implemented or supported.
    Unimplemented = 12,
    /// Internal error.
    Internal = 13,
    /// The service is currently unavailable.
    Unavailable = 14,
    /// Unrecoverable data loss or corruption.
    DataLoss = 15,
    /// The request lacks valid authentication credentials.
    Unauthenticated = 16,
}

impl CanonicalCode {
    /// All codes, in numeric order.
    pub const ALL: [CanonicalCode; 17] = [
        CanonicalCode::Ok,
        CanonicalCode::Cancelled,
        CanonicalCode::Unknown,
        CanonicalCode::InvalidArgument,
        CanonicalCode::DeadlineExceeded,
        CanonicalCode::NotFound,
        CanonicalCode::AlreadyExists,
        CanonicalCode::PermissionDenied,
        CanonicalCode::ResourceExhausted,
        CanonicalCode::FailedPrecondition,
        CanonicalCode::Aborted,
        CanonicalCode::OutOfRange,
        CanonicalCode::Unimplemented,
        CanonicalCode::Internal,
        CanonicalCode::Unavailable,
        CanonicalCode::DataLoss,
        CanonicalCode::Unauthenticated,
    ];

    /// A status with this code and no description.
    pub fn to_status(self) -> Status {
        Status::new(self)
    }
}

/// The completion status of a span: a canonical code plus an optional
/// developer-facing description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    code: CanonicalCode,
    description: Option<Cow<'static, str>>,
}

impl Status {
    /// The OK status.
    pub const OK: Status = Status {
        code: CanonicalCode::Ok,
        description: None,
    };

    /// A status with the given code and no description.
    pub const fn new(code: CanonicalCode) -> Self {
        Status {
            code,
            description: None,
        }
    }

    /// This status with a description attached.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The canonical code.
    pub fn canonical_code(&self) -> CanonicalCode {
        self.code
    }

    /// The description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether the status is OK.
    pub fn is_ok(&self) -> bool {
        self.code == CanonicalCode::Ok
    }
}
