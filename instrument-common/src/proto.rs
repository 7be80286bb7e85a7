//! Datastore protocol messages.
//!
//! Only the subset needed to add samples is declared here. Field tags match
//! the datastore's proto2 schema (`openinstrument.proto`), so batches encoded
//! by agents are readable by every datastore server version.

/// A single name/value label on a variable.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Label {
    #[prost(string, required, tag = "1")]
    pub label: String,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StreamVariable {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub label: Vec<Label>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Value {
    /// Unix epoch milliseconds.
    #[prost(uint64, required, tag = "1")]
    pub timestamp: u64,
    #[prost(double, optional, tag = "2")]
    pub double_value: Option<f64>,
    #[prost(string, optional, tag = "3")]
    pub string_value: Option<String>,
    #[prost(uint64, optional, tag = "4")]
    pub end_timestamp: Option<u64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ValueStream {
    #[prost(message, optional, tag = "2")]
    pub variable: Option<StreamVariable>,
    #[prost(message, repeated, tag = "4")]
    pub value: Vec<Value>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AddRequest {
    #[prost(message, repeated, tag = "1")]
    pub stream: Vec<ValueStream>,
    #[prost(bool, optional, tag = "2")]
    pub forwarded: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AddResponse {
    #[prost(bool, required, tag = "1")]
    pub success: bool,
    #[prost(string, optional, tag = "2")]
    pub errormessage: Option<String>,
}
