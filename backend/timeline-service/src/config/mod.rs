/// Configuration management for Timeline Service
///
/// Loads configuration from environment variables.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub gateways: GatewayConfig,
    #[serde(default)]
    pub timeline: TimelineConfig,
    #[serde(default)]
    pub fanout: FanOutConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Service name, also used as the Kafka consumer group
    pub service_name: String,
    pub host: String,
    pub http_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// Redis configuration for the day-bucket cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
    /// Bucket TTL in seconds, 0 keeps buckets forever
    #[serde(default = "default_bucket_ttl_secs")]
    pub bucket_ttl_secs: u64,
    /// Optimistic write attempts before a conflict is surfaced
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
    /// Upper bound of buckets written by one atomic batch
    #[serde(default = "default_max_batch_buckets")]
    pub max_batch_buckets: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Empty disables the consumer and the producer
    pub brokers: String,
    pub post_created_topic: String,
    pub add_post_topic: String,
    pub remove_post_topic: String,
    /// Back-off before a failed message is redelivered
    pub redelivery_backoff_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: String::new(),
            post_created_topic: "post.created".to_string(),
            add_post_topic: "user_timeline.add_post".to_string(),
            remove_post_topic: "user_timeline.remove_post".to_string(),
            redelivery_backoff_ms: 1000,
        }
    }
}

/// Remote post and follow services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub post_service_url: String,
    pub follow_service_url: String,
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Longest day range a single read may request
    pub max_range_days: i64,
    /// References loaded for the whole-timeline read
    pub max_posts: i64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            max_range_days: 31,
            max_posts: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanOutConfig {
    /// Simultaneous follower emissions per post
    pub max_concurrency: usize,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 64,
        }
    }
}

/// Background pool for detached cache cleanup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

fn default_run_migrations() -> bool {
    true
}

fn default_bucket_ttl_secs() -> u64 {
    7 * 24 * 3600
}

fn default_max_conflict_retries() -> u32 {
    5
}

fn default_max_batch_buckets() -> usize {
    100
}

fn default_gateway_timeout_secs() -> u64 {
    5
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "timeline-service".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env_or("PORT", 8080),
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable not set")?,
            max_connections: env_or("DB_MAX_CONNECTIONS", default_max_connections()),
            min_connections: env_or("DB_MIN_CONNECTIONS", default_min_connections()),
            run_migrations: env_or("DB_RUN_MIGRATIONS", default_run_migrations()),
        };

        let redis = RedisConfig {
            url: std::env::var("REDIS_URL").context("REDIS_URL environment variable not set")?,
            bucket_ttl_secs: env_or("TIMELINE_BUCKET_TTL_SECS", default_bucket_ttl_secs()),
            max_conflict_retries: env_or(
                "TIMELINE_MAX_CONFLICT_RETRIES",
                default_max_conflict_retries(),
            ),
            max_batch_buckets: env_or("TIMELINE_MAX_BATCH_BUCKETS", default_max_batch_buckets()),
        };

        let kafka_defaults = KafkaConfig::default();
        let kafka = KafkaConfig {
            brokers: std::env::var("KAFKA_BROKERS").unwrap_or_default(),
            post_created_topic: std::env::var("KAFKA_POST_CREATED_TOPIC")
                .unwrap_or(kafka_defaults.post_created_topic),
            add_post_topic: std::env::var("KAFKA_ADD_POST_TOPIC")
                .unwrap_or(kafka_defaults.add_post_topic),
            remove_post_topic: std::env::var("KAFKA_REMOVE_POST_TOPIC")
                .unwrap_or(kafka_defaults.remove_post_topic),
            redelivery_backoff_ms: env_or(
                "KAFKA_REDELIVERY_BACKOFF_MS",
                kafka_defaults.redelivery_backoff_ms,
            ),
        };

        let gateways = GatewayConfig {
            post_service_url: std::env::var("POST_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8081".to_string()),
            follow_service_url: std::env::var("FOLLOW_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8082".to_string()),
            timeout_secs: env_or("GATEWAY_TIMEOUT_SECS", default_gateway_timeout_secs()),
        };

        let timeline_defaults = TimelineConfig::default();
        let timeline = TimelineConfig {
            max_range_days: env_or("TIMELINE_MAX_RANGE_DAYS", timeline_defaults.max_range_days),
            max_posts: env_or("TIMELINE_MAX_POSTS", timeline_defaults.max_posts),
        };

        let fanout = FanOutConfig {
            max_concurrency: env_or(
                "FANOUT_MAX_CONCURRENCY",
                FanOutConfig::default().max_concurrency,
            ),
        };

        let cleanup_defaults = CleanupConfig::default();
        let cleanup = CleanupConfig {
            workers: env_or("CLEANUP_WORKERS", cleanup_defaults.workers),
            queue_capacity: env_or("CLEANUP_QUEUE_CAPACITY", cleanup_defaults.queue_capacity),
        };

        let config = Config {
            app,
            database,
            redis,
            kafka,
            gateways,
            timeline,
            fanout,
            cleanup,
        };
        config.validate().context("Invalid timeline configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeline.max_range_days < 1 {
            return Err(anyhow!("TIMELINE_MAX_RANGE_DAYS must be at least 1"));
        }

        if self.timeline.max_posts < 1 {
            return Err(anyhow!("TIMELINE_MAX_POSTS must be at least 1"));
        }

        // A range miss writes one bucket per day in a single batch
        if self.timeline.max_range_days as usize > self.redis.max_batch_buckets {
            return Err(anyhow!(
                "TIMELINE_MAX_RANGE_DAYS ({}) exceeds TIMELINE_MAX_BATCH_BUCKETS ({})",
                self.timeline.max_range_days,
                self.redis.max_batch_buckets
            ));
        }

        Ok(())
    }

    pub fn kafka_enabled(&self) -> bool {
        !self.kafka.brokers.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("REDIS_URL", "redis://localhost");

        let config = Config::from_env().unwrap();

        assert_eq!(config.app.service_name, "timeline-service");
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.redis.max_conflict_retries, 5);
        assert_eq!(config.redis.max_batch_buckets, 100);
        assert_eq!(config.kafka.add_post_topic, "user_timeline.add_post");
        assert_eq!(config.timeline.max_range_days, 31);
        assert_eq!(config.fanout.max_concurrency, 64);
        assert_eq!(config.cleanup.workers, 4);
    }

    #[test]
    fn test_range_must_fit_in_one_bucket_batch() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("REDIS_URL", "redis://localhost");

        let mut config = Config::from_env().unwrap();
        assert!(config.validate().is_ok());

        config.timeline.max_range_days = 120;
        config.redis.max_batch_buckets = 100;
        assert!(config.validate().is_err());

        config.redis.max_batch_buckets = 120;
        assert!(config.validate().is_ok());

        config.timeline.max_posts = 0;
        assert!(config.validate().is_err());
    }
}
