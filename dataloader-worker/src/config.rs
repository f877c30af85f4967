use std::num::NonZeroUsize;
use std::str::FromStr;

use dataloader_common::converter::PayloadKind;
use dataloader_common::kafka::KafkaConfig;
use envconfig::Envconfig;

use crate::pipeline::FailurePolicy;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3301")]
    pub port: u16,

    #[envconfig(from = "MONGODB_URI", default = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    #[envconfig(from = "DATABASE_NAME")]
    pub database_name: NonEmptyString,

    // Records are written to a collection named after their topic unless this is set
    #[envconfig(from = "MONGODB_COLLECTION")]
    pub collection: Option<NonEmptyString>,

    #[envconfig(default = "posts")]
    pub payload_kind: PayloadKind,

    #[envconfig(default = "fail")]
    pub on_record_error: FailurePolicy,

    #[envconfig(default = "10")]
    pub record_buffer_capacity: NonZeroUsize,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl std::fmt::Display for StringIsEmptyError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "value must not be empty")
    }
}

impl std::error::Error for StringIsEmptyError {}

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::init_from_hashmap(&env(&[("DATABASE_NAME", "reddit")])).unwrap();

        assert_eq!(config.database_name.as_str(), "reddit");
        assert_eq!(config.mongodb_uri, "mongodb://localhost:27017");
        assert_eq!(config.collection, None);
        assert_eq!(config.payload_kind, PayloadKind::Posts);
        assert_eq!(config.on_record_error, FailurePolicy::Fail);
        assert_eq!(config.record_buffer_capacity.get(), 10);
        assert_eq!(config.kafka.kafka_topic, "reddit");
        assert_eq!(config.bind(), "0.0.0.0:3301");
    }

    #[test]
    fn test_overrides() {
        let config = Config::init_from_hashmap(&env(&[
            ("DATABASE_NAME", "reddit"),
            ("MONGODB_COLLECTION", "posts"),
            ("PAYLOAD_KIND", "opaque"),
            ("ON_RECORD_ERROR", "skip_malformed"),
            ("RECORD_BUFFER_CAPACITY", "64"),
            ("REDDIT_TOPIC", "reddit_latest"),
        ]))
        .unwrap();

        assert_eq!(
            config.collection,
            Some(NonEmptyString("posts".to_owned()))
        );
        assert_eq!(config.payload_kind, PayloadKind::Opaque);
        assert_eq!(config.on_record_error, FailurePolicy::SkipMalformed);
        assert_eq!(config.record_buffer_capacity.get(), 64);
        assert_eq!(config.kafka.kafka_topic, "reddit_latest");
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::init_from_hashmap(&env(&[])).is_err());
        assert!(Config::init_from_hashmap(&env(&[("DATABASE_NAME", "")])).is_err());
        assert!(Config::init_from_hashmap(&env(&[
            ("DATABASE_NAME", "reddit"),
            ("RECORD_BUFFER_CAPACITY", "0"),
        ]))
        .is_err());
        assert!(Config::init_from_hashmap(&env(&[
            ("DATABASE_NAME", "reddit"),
            ("ON_RECORD_ERROR", "retry"),
        ]))
        .is_err());
    }
}
