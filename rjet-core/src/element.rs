use serde_json::Value;

/// The unit of data moving along the edges of a DAG
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Record {
    pub key: Option<String>,
    pub value: Value,
}

impl Record {
    pub fn new(value: Value) -> Self {
        Record { key: None, value }
    }

    pub fn entry(key: &str, value: Value) -> Self {
        Record {
            key: Some(key.to_string()),
            value,
        }
    }

    pub fn text(line: &str) -> Self {
        Record::new(Value::String(line.to_string()))
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// Bytes used to pick a partition for this record
    pub fn partition_key(&self) -> Option<&[u8]> {
        self.key.as_ref().map(|key| key.as_bytes())
    }
}

impl From<String> for Record {
    fn from(line: String) -> Self {
        Record::new(Value::String(line))
    }
}

impl From<(String, Value)> for Record {
    fn from(entry: (String, Value)) -> Self {
        Record {
            key: Some(entry.0),
            value: entry.1,
        }
    }
}
