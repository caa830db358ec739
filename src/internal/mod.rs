//! Crate-internal plumbing shared by the trace and stats subsystems.

pub(crate) mod event_queue;
