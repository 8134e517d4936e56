//! Metrics definitions for reference data.

use shared::metrics_defs::{MetricDef, MetricType};

pub const RELOAD_SUCCESS: MetricDef = MetricDef {
    name: "refdata.reload.success",
    metric_type: MetricType::Counter,
    description: "Number of successful table reloads. Tagged with table.",
};

pub const RELOAD_FAILURE: MetricDef = MetricDef {
    name: "refdata.reload.failure",
    metric_type: MetricType::Counter,
    description: "Number of reloads aborted by a data source error. Tagged with table.",
};

pub const RELOAD_ROWS: MetricDef = MetricDef {
    name: "refdata.reload.rows",
    metric_type: MetricType::Histogram,
    description: "Number of live entries after a reload. Tagged with table.",
};

pub const RELOAD_DURATION: MetricDef = MetricDef {
    name: "refdata.reload.duration",
    metric_type: MetricType::Histogram,
    description: "Time to fetch and publish a table in seconds. Tagged with table.",
};

pub const CARRIER_RESOLVED: MetricDef = MetricDef {
    name: "carrier.resolved",
    metric_type: MetricType::Counter,
    description: "Carrier resolutions. Tagged with via (ip, msisdn, none).",
};

pub const ALL_METRICS: &[MetricDef] = &[
    RELOAD_SUCCESS,
    RELOAD_FAILURE,
    RELOAD_ROWS,
    RELOAD_DURATION,
    CARRIER_RESOLVED,
];
