//! Generation of trace and span identifiers.

use std::fmt;

use rand::RngCore;

use crate::trace::{SpanId, TraceId};

/// Source of identifiers for newly started spans.
///
/// Implementations must never hand out the all-zero id, which the wire
/// format reserves as the invalid marker.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// A fresh, valid trace id.
    fn new_trace_id(&self) -> TraceId;

    /// A fresh, valid span id.
    fn new_span_id(&self) -> SpanId;
}

/// The default [`IdGenerator`]: ids drawn from the thread-local RNG.
///
/// The all-zero draw is re-drawn, so generated ids are always valid.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 16];
        loop {
            rng.fill_bytes(&mut bytes);
            let id = TraceId::from_bytes(bytes);
            if id.is_valid() {
                return id;
            }
        }
    }

    fn new_span_id(&self) -> SpanId {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 8];
        loop {
            rng.fill_bytes(&mut bytes);
            let id = SpanId::from_bytes(bytes);
            if id.is_valid() {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let generator = RandomIdGenerator;
        let a = generator.new_trace_id();
        let b = generator.new_trace_id();
        assert!(a.is_valid());
        assert!(b.is_valid());
        assert_ne!(a, b);
        assert_ne!(generator.new_span_id(), SpanId::INVALID);
    }
}
