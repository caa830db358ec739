//! Implements the in-process core of the census observability library.
//!
//! Two families of telemetry are collected concurrently from application
//! code:
//!
//! * **Distributed traces**: hierarchical [`trace::Span`]s with bounded
//!   attribute maps, timed annotations, message events and links. Completed
//!   spans for registered names are kept in the
//!   [`trace::export::SampledSpanStore`] for on-demand debugging.
//! * **Stats**: [`stats::Measurement`]s recorded against an immutable
//!   [`tags::TagContext`] and aggregated by user-declared [`stats::View`]s
//!   over cumulative or sliding-interval windows.
//!
//! Recording paths never block: span mutations take a single per-span lock,
//! and stats are handed to a dedicated worker thread through the internal
//! event queue.
//!
//! # Getting Started
//!
//! ```
//! use census_core::registry::CensusCore;
//! use census_core::trace::Sampler;
//!
//! let core = CensusCore::builder()
//!     .with_sampler(Sampler::AlwaysSample)
//!     .build();
//!
//! let span = core
//!     .tracer()
//!     .span_builder("my_operation")
//!     .start()
//!     .unwrap();
//! span.add_annotation("doing work");
//! span.end();
//!
//! core.shutdown();
//! ```
//!
//! # Feature Flags
//!
//! * `internal-logs`: forward internal diagnostics to [`tracing`]
//!   (enabled by default).
//!
//! [`tracing`]: https://crates.io/crates/tracing
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(test, deny(warnings))]

#[macro_use]
mod internal_logging;

pub(crate) mod internal;

pub mod registry;
pub mod scope;
pub mod stats;
pub mod tags;
pub mod testing;
pub mod time;
pub mod trace;

pub use internal::event_queue::{EventEntry, EventQueue};
pub use registry::CensusCore;
