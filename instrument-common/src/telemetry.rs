use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Error;
use crate::proto;

/// A metric identity: hierarchical name plus a set of labels.
///
/// Two variables are the same series when both the name and the full label
/// set are equal. Labels are kept sorted so equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable {
    /// Slash-delimited path (e.g., "/network/interface/stats/ifInOctets").
    pub name: String,

    /// Label name to value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Variable {
    /// Create a variable with no labels.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Add a label to this variable.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add multiple labels to this variable.
    pub fn with_labels<K, V, I>(mut self, labels: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.labels
            .extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Look up a label value.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Convert to the datastore representation.
    pub fn to_proto(&self) -> proto::StreamVariable {
        proto::StreamVariable {
            name: self.name.clone(),
            label: self
                .labels
                .iter()
                .map(|(k, v)| proto::Label {
                    label: k.clone(),
                    value: Some(v.clone()),
                })
                .collect(),
        }
    }
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ',' | '"' | '\'' | '{' | '}' | '=' | '\\'))
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.labels.is_empty() {
            return Ok(());
        }
        write!(f, "{{")?;
        for (i, (key, value)) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if needs_quoting(value) {
                let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "{}=\"{}\"", key, escaped)?;
            } else {
                write!(f, "{}={}", key, value)?;
            }
        }
        write!(f, "}}")
    }
}

/// Split a label list on commas/whitespace, honouring shell-style quotes.
fn split_labels(input: &str) -> Result<Vec<String>, Error> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() || c == ',' => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped @ ('"' | '\\')) => current.push(escaped),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err(Error::Variable("unterminated escape".into())),
                        },
                        Some(other) => current.push(other),
                        None => return Err(Error::Variable("unterminated quote".into())),
                    }
                }
            }
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(other) => current.push(other),
                        None => return Err(Error::Variable("unterminated quote".into())),
                    }
                }
            }
            other => {
                in_token = true;
                current.push(other);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

impl FromStr for Variable {
    type Err = Error;

    /// Parse the textual form `name{label=value, other="quoted value"}`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, rest) = match s.find('{') {
            Some(pos) => (&s[..pos], Some(&s[pos + 1..])),
            None => (s, None),
        };
        if name.is_empty() {
            return Err(Error::Variable(format!("missing name in '{}'", s)));
        }

        let mut variable = Variable::new(name);
        if let Some(rest) = rest {
            let body = rest
                .strip_suffix('}')
                .ok_or_else(|| Error::Variable(format!("unterminated label set in '{}'", s)))?;
            for token in split_labels(body)? {
                let (key, value) = token
                    .split_once('=')
                    .ok_or_else(|| Error::Variable(format!("label '{}' has no value", token)))?;
                variable.labels.insert(key.to_string(), value.to_string());
            }
        }
        Ok(variable)
    }
}

/// A sample value: either a double or a string, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Double(f64),
    Text(String),
}

impl From<f64> for SampleValue {
    fn from(v: f64) -> Self {
        SampleValue::Double(v)
    }
}

impl From<i64> for SampleValue {
    fn from(v: i64) -> Self {
        SampleValue::Double(v as f64)
    }
}

impl From<u64> for SampleValue {
    fn from(v: u64) -> Self {
        SampleValue::Double(v as f64)
    }
}

impl From<String> for SampleValue {
    fn from(v: String) -> Self {
        SampleValue::Text(v)
    }
}

impl From<&str> for SampleValue {
    fn from(v: &str) -> Self {
        SampleValue::Text(v.to_string())
    }
}

/// A single timestamped value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unix epoch milliseconds.
    pub timestamp: u64,
    pub value: SampleValue,
}

impl Sample {
    pub fn new(timestamp: u64, value: impl Into<SampleValue>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }

    /// Convert to the datastore representation.
    pub fn to_proto(&self) -> proto::Value {
        let mut value = proto::Value {
            timestamp: self.timestamp,
            ..Default::default()
        };
        match &self.value {
            SampleValue::Double(v) => value.double_value = Some(*v),
            SampleValue::Text(s) => value.string_value = Some(s.clone()),
        }
        value
    }
}

/// An outgoing batch of samples, one entry per emitted variable.
///
/// Entries are append-only; nothing that was emitted is changed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    entries: Vec<(Variable, Sample)>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sample for `variable`.
    pub fn push(&mut self, variable: Variable, sample: Sample) {
        self.entries.push((variable, sample));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(Variable, Sample)] {
        &self.entries
    }

    /// Find the samples recorded for variables with the given name.
    pub fn find<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a (Variable, Sample)> + 'a {
        self.entries.iter().filter(move |(v, _)| v.name == name)
    }

    /// Build the datastore `AddRequest` for this batch.
    pub fn to_add_request(&self) -> proto::AddRequest {
        proto::AddRequest {
            stream: self
                .entries
                .iter()
                .map(|(variable, sample)| proto::ValueStream {
                    variable: Some(variable.to_proto()),
                    value: vec![sample.to_proto()],
                })
                .collect(),
            forwarded: None,
        }
    }
}

/// Get the current timestamp in milliseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch (should never happen in practice).
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
