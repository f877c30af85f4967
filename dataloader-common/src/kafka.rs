use async_trait::async_trait;
use envconfig::Envconfig;
use rdkafka::{
    consumer::{Consumer, ConsumerContext, StreamConsumer},
    error::KafkaError,
    ClientConfig, ClientContext, Message, Statistics,
};
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::metrics_consts::CONSUMER_LAG;
use crate::source::LogConsumer;
use crate::types::RawRecord;

#[derive(Envconfig, Clone, Debug)]
pub struct KafkaConfig {
    #[envconfig(from = "KAFKA_BOOTSTRAP", default = "localhost:9092")]
    pub kafka_hosts: String, // Comma-separated seed brokers

    #[envconfig(from = "REDDIT_TOPIC", default = "reddit")]
    pub kafka_topic: String,

    #[envconfig(from = "DEFAULT_REDDIT_CONSUMER_GROUP", default = "dataloader")]
    pub kafka_consumer_group: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    #[envconfig(default = "earliest")]
    pub kafka_consumer_offset_reset: String, // earliest, latest
}

impl From<&KafkaConfig> for ClientConfig {
    fn from(config: &KafkaConfig) -> Self {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("group.id", &config.kafka_consumer_group)
            .set("auto.offset.reset", &config.kafka_consumer_offset_reset)
            .set("enable.partition.eof", "false");

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };
        client_config
    }
}

pub struct KafkaContext;

impl ClientContext for KafkaContext {
    fn stats(&self, stats: Statistics) {
        for (topic, topic_stats) in stats.topics {
            for (partition, partition_stats) in topic_stats.partitions {
                // librdkafka reports -1 for partitions this consumer does not own
                if partition < 0 || partition_stats.consumer_lag < 0 {
                    continue;
                }
                metrics::gauge!(
                    CONSUMER_LAG,
                    "topic" => topic.clone(),
                    "partition" => partition.to_string()
                )
                .set(partition_stats.consumer_lag as f64);
            }
        }
    }
}

impl ConsumerContext for KafkaContext {}

/// The log consumer used in production: one topic, one consumer group.
pub struct KafkaConsumer {
    consumer: StreamConsumer<KafkaContext>,
    topic: String,
}

impl KafkaConsumer {
    pub fn new(config: &KafkaConfig) -> Result<Self, FetchError> {
        debug!(
            hosts = %config.kafka_hosts,
            group = %config.kafka_consumer_group,
            "creating kafka consumer"
        );
        let consumer: StreamConsumer<KafkaContext> = ClientConfig::from(config)
            .create_with_context(KafkaContext)
            .map_err(FetchError::Client)?;
        consumer
            .subscribe(&[config.kafka_topic.as_str()])
            .map_err(FetchError::Client)?;
        info!(topic = %config.kafka_topic, "subscribed to topic");

        Ok(Self {
            consumer,
            topic: config.kafka_topic.clone(),
        })
    }
}

#[async_trait]
impl LogConsumer for KafkaConsumer {
    async fn poll(&mut self) -> Result<Option<RawRecord>, FetchError> {
        let message = match self.consumer.recv().await {
            Ok(message) => message,
            Err(KafkaError::PartitionEOF(partition)) => {
                debug!(partition, "reached end of partition");
                return Ok(None);
            }
            Err(source) => {
                return Err(FetchError::Kafka {
                    topic: self.topic.clone(),
                    source,
                })
            }
        };

        let Some(payload) = message.payload() else {
            warn!(
                partition = message.partition(),
                offset = message.offset(),
                "received empty payload"
            );
            return Ok(None);
        };

        Ok(Some(RawRecord {
            payload: payload.to_vec(),
            topic: message.topic().to_owned(),
            partition: message.partition(),
            offset: message.offset(),
        }))
    }

    fn close(self) {
        self.consumer.unsubscribe();
        // Dropping the consumer leaves the group and commits outstanding offsets. It blocks.
        drop(self.consumer);
    }
}
