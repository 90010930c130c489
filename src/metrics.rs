//! Optional observability for check and fix passes.
//!
//! - feature `metrics`: prometheus counters and a check-duration histogram in
//!   a dedicated [`prometheus::Registry`] exposed through [`METRICS`]
//! - feature `tracing`: span constructors used around connections, statements
//!   and whole passes

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<SchemaMetrics> = Lazy::new(SchemaMetrics::init);

#[cfg(feature = "metrics")]
pub struct SchemaMetrics {
    pub registry: Registry,
    pub checks_total: IntCounterVec,
    pub fixes_total: IntCounterVec,
    pub check_duration: Histogram,
}

#[cfg(feature = "metrics")]
impl SchemaMetrics {
    /// Build the collectors and register them in a fresh registry
    ///
    /// # Panics
    ///
    /// Panics if the static metric definitions are rejected by prometheus,
    /// which only happens if they are edited into an invalid shape.
    #[must_use]
    pub fn init() -> Self {
        let registry = Registry::new();

        let checks_total = IntCounterVec::new(
            Opts::new("schemaguard_checks_total", "Change item checks by resulting status"),
            &["status"],
        )
        .expect("valid checks_total definition");

        let fixes_total = IntCounterVec::new(
            Opts::new("schemaguard_fixes_total", "Change item fixes by rerun status"),
            &["status"],
        )
        .expect("valid fixes_total definition");

        let check_duration = Histogram::with_opts(HistogramOpts::new(
            "schemaguard_check_duration_seconds",
            "Duration of single check queries",
        ))
        .expect("valid check_duration definition");

        let collectors: [Box<dyn prometheus::core::Collector>; 3] = [
            Box::new(checks_total.clone()),
            Box::new(fixes_total.clone()),
            Box::new(check_duration.clone()),
        ];
        for collector in collectors {
            if let Err(e) = registry.register(collector) {
                log::warn!("failed to register schemaguard metric: {e}");
            }
        }

        Self {
            registry,
            checks_total,
            fixes_total,
            check_duration,
        }
    }

    pub fn record_check(&self, status: &str, elapsed: std::time::Duration) {
        self.checks_total.with_label_values(&[status]).inc();
        self.check_duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_fix(&self, status: &str) {
        self.fixes_total.with_label_values(&[status]).inc();
    }

    /// Render the registry in the prometheus text exposition format
    #[must_use]
    pub fn gather_text(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            log::warn!("failed to encode schemaguard metrics: {e}");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    /// Statements longer than this are truncated in span fields
    const MAX_STATEMENT_LEN: usize = 120;

    pub fn connect_span() -> Span {
        info_span!("schemaguard.connect")
    }

    pub fn statement_span(sql: &str) -> Span {
        info_span!("schemaguard.statement", sql = %truncate(sql))
    }

    pub fn check_pass_span(items: usize) -> Span {
        info_span!("schemaguard.check", items)
    }

    pub fn fix_pass_span(items: usize) -> Span {
        info_span!("schemaguard.fix", items)
    }

    fn truncate(sql: &str) -> &str {
        match sql.char_indices().nth(MAX_STATEMENT_LEN) {
            Some((end, _)) => &sql[..end],
            None => sql,
        }
    }

}
