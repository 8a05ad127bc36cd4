use actix_web::{middleware, web, App, HttpServer};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timeline_service::clients::{HttpFollowerGateway, HttpPostGateway};
use timeline_service::config::Config;
use timeline_service::consumers::{
    MessageRouter, TimelineEventsConsumer, TimelineEventsConsumerConfig, TopicNames,
};
use timeline_service::handlers;
use timeline_service::repository::{
    DayBucketStore, EventPublisher, FollowerGateway, PostGateway, PostgresTimelineRepository,
    RedisDayBucketStore, TimelineRepository,
};
use timeline_service::services::{
    CleanupPool, FanOutPublisher, KafkaEventPublisher, TimelineFillService, TimelineSettings,
};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true),
        )
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        env = %config.app.env,
        service = %config.app.service_name,
        "Starting timeline-service"
    );

    let pg_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pg_pool)
            .await
            .context("Failed to run timeline migrations")?;
        info!("Database migrations applied");
    }

    let bucket_store = RedisDayBucketStore::connect(
        &config.redis.url,
        config.redis.bucket_ttl_secs,
        config.redis.max_batch_buckets,
    )
    .await
    .context("Failed to connect to Redis")?;
    bucket_store.ping().await.context("Redis health check failed")?;
    info!("Redis day-bucket store ready");

    let gateway_timeout = Duration::from_secs(config.gateways.timeout_secs);
    let posts: Arc<dyn PostGateway> = Arc::new(HttpPostGateway::new(
        &config.gateways.post_service_url,
        gateway_timeout,
    )?);
    let followers: Arc<dyn FollowerGateway> = Arc::new(HttpFollowerGateway::new(
        &config.gateways.follow_service_url,
        gateway_timeout,
    )?);
    let timeline_repository = PostgresTimelineRepository::new(pg_pool.clone());
    timeline_repository
        .health_check()
        .await
        .context("PostgreSQL health check failed")?;
    let references: Arc<dyn TimelineRepository> = Arc::new(timeline_repository);
    let buckets: Arc<dyn DayBucketStore> = Arc::new(bucket_store);

    let (cleanup, _cleanup_workers) = CleanupPool::start(
        Arc::clone(&buckets),
        config.cleanup.workers,
        config.cleanup.queue_capacity,
        config.redis.max_conflict_retries,
    );

    let timeline = Arc::new(TimelineFillService::new(
        posts,
        references,
        buckets,
        cleanup,
        TimelineSettings::from_config(&config),
    ));

    let mut join_set = JoinSet::new();

    let http_addr = format!("{}:{}", config.app.host, config.app.http_port);
    let http_timeline = Arc::clone(&timeline);
    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(Arc::clone(&http_timeline)))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(&http_addr)
    .context("Failed to bind HTTP server")?
    .run();

    let server_handle = http_server.handle();
    join_set.spawn(async move {
        http_server
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
    });
    info!(addr = %http_addr, "HTTP server started");

    if config.kafka_enabled() {
        let publisher: Arc<dyn EventPublisher> = Arc::new(KafkaEventPublisher::new(
            &config.kafka.brokers,
            &config.app.service_name,
        )?);
        let fanout = Arc::new(FanOutPublisher::new(
            followers,
            publisher,
            config.kafka.add_post_topic.clone(),
            config.fanout.max_concurrency,
        ));
        let router = Arc::new(MessageRouter::new(
            TopicNames::from(&config.kafka),
            fanout,
            Arc::clone(&timeline),
        ));
        let consumer_config = TimelineEventsConsumerConfig {
            brokers: config.kafka.brokers.clone(),
            group_id: config.app.service_name.clone(),
            redelivery_backoff: Duration::from_millis(config.kafka.redelivery_backoff_ms),
        };

        join_set.spawn(TimelineEventsConsumer::new(router, consumer_config).run());
        info!("Timeline events consumer started");
    } else {
        info!("Timeline events consumer disabled: KAFKA_BROKERS not configured");
    }

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            server_handle.stop(true).await;
        }
        Some(result) = join_set.join_next() => {
            match result {
                Ok(Ok(())) => info!("Task completed"),
                Ok(Err(e)) => {
                    tracing::error!("Task failed: {:#}", e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!("Task panicked: {:#}", e);
                    return Err(anyhow::anyhow!("Task panicked: {}", e));
                }
            }
        }
    }

    join_set.abort_all();
    info!("timeline-service shutting down");
    Ok(())
}
