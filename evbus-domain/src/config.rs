//! 事件总线配置
//!
//! 聚合路由前缀、默认 topic、生产方标识，以及投递器、即时发布器与消费者的运行参数。
//! 支持从环境变量（含 `.env`）加载，缺省项回落为默认值。
//!
use crate::error::{EvbusError, EvbusResult};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// 事件总线配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EvbusConfig {
    /// 部署级路由前缀：tag = prefix + eventType
    pub tag_prefix: String,
    /// 信封未指定 topic 时使用的默认 topic
    pub default_topic: String,
    /// 生产方服务实例/分组标识
    pub publisher_id: String,
    /// 消费组标识
    pub consumer_group: String,
    /// 延迟投递可设置的最远时间（受 Broker 能力限制）
    pub max_delivery_horizon: Duration,
    pub dispatcher: DispatcherConfig,
    pub immediate: ImmediatePublishConfig,
    pub consumer: ConsumerConfig,
}

impl Default for EvbusConfig {
    fn default() -> Self {
        Self {
            tag_prefix: String::new(),
            default_topic: "evbus".to_string(),
            publisher_id: "evbus".to_string(),
            consumer_group: "evbus-group".to_string(),
            max_delivery_horizon: Duration::from_secs(7 * 24 * 60 * 60),
            dispatcher: DispatcherConfig::default(),
            immediate: ImmediatePublishConfig::default(),
            consumer: ConsumerConfig::default(),
        }
    }
}

/// Outbox 投递器配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 扫描周期
    pub interval: Duration,
    /// 待发送积压超过该值时告警（非硬上限）
    pub backlog_warn_threshold: usize,
    /// 最大发送次数，达到后记录进入 SendFailed
    pub max_attempts: u32,
    /// 单条记录锁的 TTL，持有者崩溃后锁自动失效
    pub lock_ttl: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            backlog_warn_threshold: 100,
            max_attempts: 5,
            lock_ttl: Duration::from_secs(10),
        }
    }
}

/// 即时发布器配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ImmediatePublishConfig {
    /// 失败重试的退避序列，长度即重试次数
    pub backoff: Vec<Duration>,
}

impl Default for ImmediatePublishConfig {
    fn default() -> Self {
        Self {
            backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(10),
            ],
        }
    }
}

/// 消费者配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// 不同消息之间的并发处理上限
    pub handler_concurrency: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            handler_concurrency: 8,
        }
    }
}

impl EvbusConfig {
    /// 从环境变量加载（开发环境下会先读取 `.env`）
    pub fn from_env() -> EvbusResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 以任意键值来源加载，未设置的键保持默认值
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> EvbusResult<Self> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("EVBUS_TAG_PREFIX") {
            cfg.tag_prefix = v;
        }
        if let Some(v) = lookup("EVBUS_DEFAULT_TOPIC") {
            cfg.default_topic = v;
        }
        if let Some(v) = lookup("EVBUS_PUBLISHER_ID") {
            cfg.publisher_id = v;
        }
        if let Some(v) = lookup("EVBUS_CONSUMER_GROUP") {
            cfg.consumer_group = v;
        }
        if let Some(v) = lookup("EVBUS_MAX_DELIVERY_HORIZON_SECS") {
            cfg.max_delivery_horizon =
                Duration::from_secs(parse("EVBUS_MAX_DELIVERY_HORIZON_SECS", &v)?);
        }
        if let Some(v) = lookup("EVBUS_DISPATCH_INTERVAL_MS") {
            cfg.dispatcher.interval = Duration::from_millis(parse("EVBUS_DISPATCH_INTERVAL_MS", &v)?);
        }
        if let Some(v) = lookup("EVBUS_DISPATCH_BACKLOG_WARN") {
            cfg.dispatcher.backlog_warn_threshold = parse("EVBUS_DISPATCH_BACKLOG_WARN", &v)?;
        }
        if let Some(v) = lookup("EVBUS_DISPATCH_MAX_ATTEMPTS") {
            cfg.dispatcher.max_attempts = parse("EVBUS_DISPATCH_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("EVBUS_LOCK_TTL_MS") {
            cfg.dispatcher.lock_ttl = Duration::from_millis(parse("EVBUS_LOCK_TTL_MS", &v)?);
        }
        if let Some(v) = lookup("EVBUS_PUBLISH_BACKOFF_MS") {
            cfg.immediate.backoff = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse::<u64>("EVBUS_PUBLISH_BACKOFF_MS", s).map(Duration::from_millis))
                .collect::<EvbusResult<Vec<_>>>()?;
        }
        if let Some(v) = lookup("EVBUS_HANDLER_CONCURRENCY") {
            cfg.consumer.handler_concurrency = parse("EVBUS_HANDLER_CONCURRENCY", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> EvbusResult<()> {
        if self.default_topic.trim().is_empty() {
            return Err(EvbusError::config("default topic must not be blank"));
        }
        if self.dispatcher.max_attempts == 0 {
            return Err(EvbusError::config("dispatcher max attempts must be positive"));
        }
        if self.dispatcher.interval.is_zero() {
            return Err(EvbusError::config("dispatcher interval must be positive"));
        }
        if self.consumer.handler_concurrency == 0 {
            return Err(EvbusError::config("handler concurrency must be positive"));
        }
        Ok(())
    }

    pub fn clustering_group(&self) -> &str {
        &self.consumer_group
    }

    pub fn broadcasting_group(&self) -> String {
        format!("{}-broadcast", self.consumer_group)
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> EvbusResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| EvbusError::config(format!("{name}: {e}")))
}
