use std::collections::BTreeMap;

pub use common::config::MetricType;
use common::config::MetricConfig;

/// Label name to value, iterated in key order.
pub type Labels = BTreeMap<String, String>;

/// Static description of one Prometheus series family.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricDescriptor {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    /// Labels attached to every sample after the row-derived ones.
    pub extra_labels: Labels,
}

impl MetricDescriptor {
    pub fn new(name: impl Into<String>, help: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            metric_type,
            extra_labels: Labels::new(),
        }
    }

    pub fn with_extra_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_labels.insert(name.into(), value.into());
        self
    }

    pub fn has_labels(&self, row_labels: &Labels) -> bool {
        !row_labels.is_empty() || !self.extra_labels.is_empty()
    }
}

impl From<&MetricConfig> for MetricDescriptor {
    fn from(config: &MetricConfig) -> Self {
        Self {
            name: config.name.clone(),
            help: config.help.clone(),
            metric_type: config.metric_type,
            extra_labels: config.extra_labels.clone(),
        }
    }
}

/// One output sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample<'a> {
    pub metric: &'a MetricDescriptor,
    pub labels: Labels,
    pub value: f64,
    pub timestamp_ms: i64,
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
