use crate::error::{OpenPlatformError, Result};
use prometheus::{Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::time::Duration;

pub struct Metrics {
    registry: Registry,

    // Open platform API
    pub api_calls_total: IntCounterVec,
    pub api_failures_total: IntCounter,
    pub api_timeouts_total: IntCounter,
    pub api_call_duration: Histogram,

    // Directory
    pub directory_hosts: IntGauge,
    pub directory_syncs_total: IntCounter,
    pub directory_sync_failures: IntCounter,

    // Request logs
    pub reports_sent_total: IntCounter,
    pub reports_failed_total: IntCounter,
    pub reports_skipped_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let api_calls_total = IntCounterVec::new(
            Opts::new(
                "open_platform_api_calls_total",
                "Total number of open platform API calls",
            ),
            &["endpoint"],
        )
        .expect("metric creation failed");
        let api_failures_total = IntCounter::new(
            "open_platform_api_failures_total",
            "Open platform calls that did not return code 0",
        )
        .expect("metric creation failed");
        let api_timeouts_total = IntCounter::new(
            "open_platform_api_timeouts_total",
            "Open platform calls abandoned after the request timeout",
        )
        .expect("metric creation failed");
        let api_call_duration = Histogram::with_opts(prometheus::HistogramOpts::new(
            "open_platform_api_call_duration_seconds",
            "Open platform call duration in seconds",
        ))
        .expect("metric creation failed");

        let directory_hosts = IntGauge::new(
            "open_platform_directory_hosts",
            "Number of hosts in the proxy directory",
        )
        .expect("metric creation failed");
        let directory_syncs_total = IntCounter::new(
            "open_platform_directory_syncs_total",
            "Total number of directory syncs",
        )
        .expect("metric creation failed");
        let directory_sync_failures = IntCounter::new(
            "open_platform_directory_sync_failures_total",
            "Directory syncs that left the table unchanged",
        )
        .expect("metric creation failed");

        let reports_sent_total = IntCounter::new(
            "open_platform_reports_sent_total",
            "Request logs accepted by the platform",
        )
        .expect("metric creation failed");
        let reports_failed_total = IntCounter::new(
            "open_platform_reports_failed_total",
            "Request logs the platform did not accept",
        )
        .expect("metric creation failed");
        let reports_skipped_total = IntCounter::new(
            "open_platform_reports_skipped_total",
            "Requests the report strategy declined to log",
        )
        .expect("metric creation failed");

        registry
            .register(Box::new(api_calls_total.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(api_failures_total.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(api_timeouts_total.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(api_call_duration.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(directory_hosts.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(directory_syncs_total.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(directory_sync_failures.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(reports_sent_total.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(reports_failed_total.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(reports_skipped_total.clone()))
            .expect("metric registration failed");

        Self {
            registry,
            api_calls_total,
            api_failures_total,
            api_timeouts_total,
            api_call_duration,
            directory_hosts,
            directory_syncs_total,
            directory_sync_failures,
            reports_sent_total,
            reports_failed_total,
            reports_skipped_total,
        }
    }

    pub fn record_api_call<T>(&self, endpoint: &str, duration: Duration, outcome: &Result<T>) {
        self.api_calls_total.with_label_values(&[endpoint]).inc();
        self.api_call_duration.observe(duration.as_secs_f64());
        match outcome {
            Ok(_) => {}
            Err(OpenPlatformError::Timeout(_)) => {
                self.api_failures_total.inc();
                self.api_timeouts_total.inc();
            }
            Err(_) => self.api_failures_total.inc(),
        }
    }

    pub fn record_sync(&self, success: bool) {
        self.directory_syncs_total.inc();
        if !success {
            self.directory_sync_failures.inc();
        }
    }

    pub fn record_report(&self, success: bool) {
        if success {
            self.reports_sent_total.inc();
        } else {
            self.reports_failed_total.inc();
        }
    }

    pub fn record_report_skipped(&self) {
        self.reports_skipped_total.inc();
    }

    pub fn gather_metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Prometheus text exposition of every registered metric.
    pub fn gather_text(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.gather_metrics(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
