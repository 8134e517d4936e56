use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with outcome.",
};

pub const DECISION: MetricDef = MetricDef {
    name: "dispatch.decision",
    metric_type: MetricType::Counter,
    description: "Dispatch decisions. Tagged with outcome.",
};

pub const COLLABORATOR_ERROR: MetricDef = MetricDef {
    name: "dispatch.collaborator.error",
    metric_type: MetricType::Counter,
    description: "Failed or timed out collaborator calls. Tagged with collaborator and kind.",
};

pub const ALL_METRICS: &[MetricDef] = &[REQUEST_DURATION, DECISION, COLLABORATOR_ERROR];
