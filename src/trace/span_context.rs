//! Immutable identity of a span: trace id, span id and trace options.

use std::fmt;
use std::num::ParseIntError;

/// Options that propagate with a [`SpanContext`], packed into a single
/// byte on the wire.
///
/// The only defined bit is `sampled`; unknown bits are carried through
/// untouched so contexts received from newer processes survive a round
/// trip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceOptions(u8);

impl TraceOptions {
    const SAMPLED_BIT: u8 = 1;

    /// Options with every bit cleared.
    pub const DEFAULT: TraceOptions = TraceOptions(0);

    /// Reconstruct options from their wire byte.
    pub const fn from_byte(byte: u8) -> Self {
        TraceOptions(byte)
    }

    /// The wire representation.
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Whether the span these options belong to was chosen for sampling.
    pub const fn is_sampled(self) -> bool {
        self.0 & Self::SAMPLED_BIT != 0
    }

    /// These options with the sampled bit set or cleared.
    pub const fn with_sampled(self, sampled: bool) -> Self {
        if sampled {
            TraceOptions(self.0 | Self::SAMPLED_BIT)
        } else {
            TraceOptions(self.0 & !Self::SAMPLED_BIT)
        }
    }
}

/// A 16-byte value which identifies a given trace.
///
/// An id is valid iff at least one of its bytes is non-zero; the all-zero
/// id is reserved as the "no trace" marker. Ids order lexicographically
/// over their big-endian bytes, which for the `u128` representation is
/// plain integer order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// The invalid (all-zero) trace id.
    pub const INVALID: TraceId = TraceId(0);

    /// Reconstruct a trace id from its 16 big-endian bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(u128::from_be_bytes(bytes))
    }

    /// The id as 16 big-endian bytes.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Whether any byte of the id is non-zero.
    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// Parse an id from up to 32 hex digits.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u128::from_str_radix(hex, 16).map(TraceId)
    }

    /// The lower 8 bytes of the id as a big-endian integer.
    ///
    /// Used by probability samplers so that the decision is a deterministic
    /// function of the trace id.
    pub const fn lower_long(&self) -> u64 {
        self.0 as u64
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// An 8-byte value which identifies a given span within its trace.
///
/// As with [`TraceId`], the all-zero id is the reserved invalid marker.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// The invalid (all-zero) span id.
    pub const INVALID: SpanId = SpanId(0);

    /// Reconstruct a span id from its 8 big-endian bytes.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        SpanId(u64::from_be_bytes(bytes))
    }

    /// The id as 8 big-endian bytes.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Whether any byte of the id is non-zero.
    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// Parse an id from up to 16 hex digits.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u64::from_str_radix(hex, 16).map(SpanId)
    }
}

impl From<u64> for SpanId {
    fn from(value: u64) -> Self {
        SpanId(value)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// The portion of a span that propagates to descendant spans and across
/// process boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_options: TraceOptions,
}

impl SpanContext {
    /// The context with invalid ids and default options.
    pub const INVALID: SpanContext = SpanContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        trace_options: TraceOptions::DEFAULT,
    };

    /// Construct a span context from its parts.
    pub fn new(trace_id: TraceId, span_id: SpanId, trace_options: TraceOptions) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_options,
        }
    }

    /// The trace this span belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The span's own id.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The propagated options.
    pub fn trace_options(&self) -> TraceOptions {
        self.trace_options
    }

    /// Returns `true` if both ids are valid.
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }
}
