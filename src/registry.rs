//! Wiring of the census components and the process-wide default.
//!
//! [`CensusCore`] owns one of everything, constructed in dependency order:
//! clock, then the shared event queue, then the stats component, then the
//! trace component. A process installs at most one default core via
//! [`set_global`]; teardown is best-effort through [`CensusCore::shutdown`],
//! which interrupts the event-queue worker, drains pending entries and
//! joins it.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::internal::event_queue::EventQueue;
use crate::stats::{StatsComponent, StatsConfig, StatsRecorder, ViewManager};
use crate::time::{Clock, SystemClock};
use crate::trace::export::SampledSpanStore;
use crate::trace::{ShouldSample, StartEndHandler, TraceParams, Tracer};

const DEFAULT_QUEUE_CAPACITY: usize = 2048;

/// The trace subsystem: a [`Tracer`] wired to the [`SampledSpanStore`].
#[derive(Clone, Debug)]
pub struct TraceComponent {
    tracer: Tracer,
    sampled_span_store: Arc<SampledSpanStore>,
}

impl TraceComponent {
    /// Create the trace subsystem. The sampled span store observes every
    /// recording span through the tracer's start/end handler.
    pub fn new(clock: Arc<dyn Clock>, trace_params: TraceParams) -> Self {
        let sampled_span_store = Arc::new(SampledSpanStore::new());
        let handler: Arc<dyn StartEndHandler> = sampled_span_store.clone();
        TraceComponent {
            tracer: Tracer::new(clock, handler, trace_params),
            sampled_span_store,
        }
    }

    /// The span construction surface.
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// The sampled span debug store.
    pub fn sampled_span_store(&self) -> &Arc<SampledSpanStore> {
        &self.sampled_span_store
    }
}

/// One complete census runtime: clock, event queue, stats and tracing.
#[derive(Debug)]
pub struct CensusCore {
    clock: Arc<dyn Clock>,
    event_queue: Arc<EventQueue>,
    stats: StatsComponent,
    trace: TraceComponent,
}

impl CensusCore {
    /// Start building a core with default components.
    pub fn builder() -> CensusCoreBuilder {
        CensusCoreBuilder::default()
    }

    /// The clock every component reads.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The shared event queue.
    pub fn event_queue(&self) -> &Arc<EventQueue> {
        &self.event_queue
    }

    /// The span construction surface.
    pub fn tracer(&self) -> &Tracer {
        self.trace.tracer()
    }

    /// The sampled span debug store.
    pub fn sampled_span_store(&self) -> &Arc<SampledSpanStore> {
        self.trace.sampled_span_store()
    }

    /// The view registration and query surface.
    pub fn view_manager(&self) -> &ViewManager {
        self.stats.view_manager()
    }

    /// The measurement recording surface.
    pub fn stats_recorder(&self) -> &StatsRecorder {
        self.stats.stats_recorder()
    }

    /// Interrupt the event-queue worker, drain everything already recorded
    /// and join it. Idempotent.
    pub fn shutdown(&self) {
        self.event_queue.shutdown();
    }
}

/// Builder for [`CensusCore`].
#[derive(Debug, Default)]
pub struct CensusCoreBuilder {
    clock: Option<Arc<dyn Clock>>,
    queue_capacity: Option<usize>,
    trace_params: Option<TraceParams>,
    stats_config: Option<StatsConfig>,
}

impl CensusCoreBuilder {
    /// Use the given clock instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Capacity of the lock-free event queue, rounded up to a power of
    /// two.
    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Use the given trace params instead of the defaults.
    pub fn with_trace_params(mut self, trace_params: TraceParams) -> Self {
        self.trace_params = Some(trace_params);
        self
    }

    /// Shorthand for overriding only the default sampler.
    pub fn with_sampler<S: ShouldSample + 'static>(mut self, sampler: S) -> Self {
        let params = self.trace_params.take().unwrap_or_default();
        self.trace_params = Some(
            params
                .to_builder()
                .with_sampler(sampler)
                .build()
                .expect("sampler override keeps limits valid"),
        );
        self
    }

    /// Use the given stats configuration instead of the base one.
    pub fn with_stats_config(mut self, stats_config: StatsConfig) -> Self {
        self.stats_config = Some(stats_config);
        self
    }

    /// Construct the core: clock, then event queue, then stats, then
    /// trace.
    pub fn build(self) -> CensusCore {
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let event_queue = Arc::new(EventQueue::with_capacity(
            self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
        ));
        let stats = StatsComponent::new(
            event_queue.clone(),
            clock.clone(),
            self.stats_config.unwrap_or_default(),
        );
        let trace = TraceComponent::new(clock.clone(), self.trace_params.unwrap_or_default());
        CensusCore {
            clock,
            event_queue,
            stats,
            trace,
        }
    }
}

static GLOBAL_CORE: OnceCell<CensusCore> = OnceCell::new();

/// Install the process-wide default core. Returns `false` (and leaves the
/// existing default in place) if one was already installed.
pub fn set_global(core: CensusCore) -> bool {
    let installed = GLOBAL_CORE.set(core).is_ok();
    if !installed {
        census_warn!(name: "Registry.GlobalAlreadySet");
    }
    installed
}

/// The process-wide default core, if one has been installed.
pub fn global() -> Option<&'static CensusCore> {
    GLOBAL_CORE.get()
}
