use std::collections::HashMap;
use std::ops::Index;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{JetError, Result};

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Properties {
    name: String,
    properties: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Properties {
            name: "".to_string(),
            properties: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.properties
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.properties.insert(key.to_string(), value.to_string());
    }

    pub fn set_string(&mut self, key: String, value: String) {
        self.properties.insert(key, value);
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        match self.properties.get(key) {
            Some(v) => Ok(v.clone()),
            None => Err(JetError::Config(format!("`{}` field not found", key))),
        }
    }

    pub fn set_u32(&mut self, key: &str, value: u32) {
        self.set_string(key.to_string(), value.to_string());
    }

    pub fn get_u32(&self, key: &str) -> Result<u32> {
        self.parse(key)
    }

    pub fn set_usize(&mut self, key: &str, value: usize) {
        self.set_string(key.to_string(), value.to_string());
    }

    pub fn get_usize(&self, key: &str) -> Result<usize> {
        self.parse(key)
    }

    pub fn set_u64(&mut self, key: &str, value: u64) {
        self.set_string(key.to_string(), value.to_string());
    }

    pub fn get_u64(&self, key: &str) -> Result<u64> {
        self.parse(key)
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.set_string(key.to_string(), value.to_string());
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.parse(key)
    }

    pub fn set_duration(&mut self, key: &str, interval: Duration) {
        self.set_u64(key, interval.as_millis() as u64);
    }

    pub fn get_duration(&self, key: &str) -> Result<Duration> {
        let value = self.get_u64(key)?;
        Ok(Duration::from_millis(value))
    }

    fn parse<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.properties.get(key) {
            Some(v) => T::from_str(v.trim()).map_err(|e| {
                JetError::Config(format!("`{}` has an invalid value `{}`: {}", key, v, e))
            }),
            None => Err(JetError::Config(format!("`{}` field not found", key))),
        }
    }

    pub fn to_sub_properties(&self, prefix_key: &str) -> Properties {
        self.to_sub_properties_with_name(prefix_key, None)
    }

    pub fn to_sub_properties_with_name(&self, prefix_key: &str, name: Option<&str>) -> Properties {
        let mut properties = Properties::new();

        if let Some(name) = name {
            properties.name = name.to_string();
        }

        let pre_key = format!("{}.", prefix_key);
        for (key, value) in self.as_map() {
            if key.starts_with(pre_key.as_str()) {
                let key = key.index(pre_key.len()..);
                properties.set_string(key.to_owned(), value.to_owned());
            }
        }

        properties
    }

    pub fn extend_sub_properties(&mut self, prefix_key: &str, properties: Properties) {
        for (sub_key, sub_val) in properties.as_map() {
            let key = format!("{}.{}", prefix_key, sub_key);
            self.properties.insert(key, sub_val.to_string());
        }
    }

    pub fn to_lines_string(&self) -> String {
        let mut lines: Vec<String> = self
            .properties
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect();
        lines.sort();
        lines.join("\n")
    }

    /// Parse a flat yaml mapping, scalar values are kept in their textual form
    pub fn from_yaml_str(yaml: &str) -> Result<Properties> {
        let values: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(yaml)?;

        let mut properties = Properties::new();
        for (key, value) in values {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Sequence(seq) => seq
                    .iter()
                    .filter_map(|v| match v {
                        serde_yaml::Value::String(s) => Some(s.clone()),
                        serde_yaml::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect::<Vec<String>>()
                    .join(","),
                serde_yaml::Value::Null => continue,
                _ => {
                    return Err(JetError::Config(format!(
                        "`{}` must be a scalar or a list of scalars",
                        key
                    )))
                }
            };
            properties.set_string(key, value);
        }

        Ok(properties)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::error::JetError;
    use crate::properties::Properties;

    #[test]
    pub fn typed_properties_test() {
        let mut properties = Properties::new();
        properties.set_u32("u32", 7);
        properties.set_u64("u64", 1 << 40);
        properties.set_bool("bool", true);
        properties.set_duration("duration", Duration::from_millis(1500));

        assert_eq!(properties.get_u32("u32").unwrap(), 7);
        assert_eq!(properties.get_u64("u64").unwrap(), 1 << 40);
        assert!(properties.get_bool("bool").unwrap());
        assert_eq!(
            properties.get_duration("duration").unwrap(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    pub fn missing_and_invalid_test() {
        let mut properties = Properties::new();
        properties.set_str("n", "ten");

        match properties.get_u32("absent") {
            Err(JetError::Config(msg)) => assert!(msg.contains("absent")),
            other => panic!("unexpected {:?}", other),
        }
        match properties.get_u32("n") {
            Err(JetError::Config(msg)) => assert!(msg.contains("ten")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    pub fn sub_properties_test() {
        let mut properties = Properties::new();
        properties.set_str("a.b", "v");
        properties.set_str("a.b.c", "v1");
        properties.set_str("a.b.c.d", "v2");

        let sub_properties = properties.to_sub_properties("a.b");
        assert_eq!(sub_properties.get_string("c").unwrap(), "v1");
        assert_eq!(sub_properties.get_string("c.d").unwrap(), "v2");
        assert!(!sub_properties.contains_key("b"));
    }

    #[test]
    pub fn yaml_test() {
        let yaml = r#"
seconds_to_await: 5
cluster: client
client.addresses:
  - 127.0.0.1:5701
  - 127.0.0.1:5702
empty: ~
"#;
        let properties = Properties::from_yaml_str(yaml).unwrap();
        assert_eq!(properties.get_u64("seconds_to_await").unwrap(), 5);
        assert_eq!(properties.get_string("cluster").unwrap(), "client");
        assert_eq!(
            properties.get_string("client.addresses").unwrap(),
            "127.0.0.1:5701,127.0.0.1:5702"
        );
        assert!(!properties.contains_key("empty"));
    }
}
