use instrument_common::{Batch, Sample, SampleValue, Variable};

use crate::coerce::Coerced;

/// Appends labeled samples for one host and one poll cycle to a [`Batch`].
///
/// Every variable carries `hostname` (the polled host) and `srchost` (this
/// poller); collectors cannot override either.
#[derive(Debug, Clone)]
pub struct MetricBuilder {
    hostname: String,
    srchost: String,
    timestamp: u64,
}

impl MetricBuilder {
    pub fn new(hostname: impl Into<String>, srchost: impl Into<String>, timestamp: u64) -> Self {
        Self {
            hostname: hostname.into(),
            srchost: srchost.into(),
            timestamp,
        }
    }

    /// Append one sample for `path` with the given labels.
    pub fn emit<'l>(
        &self,
        batch: &mut Batch,
        path: &str,
        labels: impl IntoIterator<Item = (&'l str, String)>,
        value: impl Into<SampleValue>,
    ) {
        let variable = Variable::new(path)
            .with_labels(labels)
            .with_label("hostname", self.hostname.as_str())
            .with_label("srchost", self.srchost.as_str());
        batch.push(variable, Sample::new(self.timestamp, value));
    }

    /// Append a coerced field, adding its `datatype` (and `units`) labels.
    pub fn emit_coerced<'l>(
        &self,
        batch: &mut Batch,
        path: &str,
        labels: impl IntoIterator<Item = (&'l str, String)>,
        coerced: Coerced,
    ) {
        let mut labels: Vec<(&str, String)> = labels.into_iter().collect();
        labels.push(("datatype", coerced.datatype.as_str().to_string()));
        if let Some(units) = coerced.units {
            labels.push(("units", units.to_string()));
        }
        self.emit(batch, path, labels, coerced.value);
    }
}
