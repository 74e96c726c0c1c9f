//! Outbox 投递器（OutboxDispatcher）
//!
//! 周期扫描 `WaitSend` 记录并发送到 Broker：
//! - 按创建时间升序逐条处理，积压超过阈值时告警；
//! - 每条记录先非阻塞获取带 TTL 的记录锁，抢不到即跳过（其他实例正在处理）；
//! - 持锁后重读状态，已离开 `WaitSend` 则跳过；
//! - 发送成功置 `SendSuccess`，失败累加 `count`，达到上限置 `SendFailed`；
//! - 无论结果如何都释放锁。
//!
//! 触发器按固定节奏 fire-and-forget 地启动扫描周期，慢周期不会阻塞下一次触发，
//! 周期之间的重叠由记录锁保证正确性。
//!
use super::record::{OutboxRecord, OutboxStatus};
use super::store::{DeliveryUpdate, OutboxStore};
use crate::broker::{BrokerClient, OutboundMessage};
use crate::config::DispatcherConfig;
use crate::envelope::TraceContext;
use crate::error::EvbusResult;
use crate::id_generator::{IdGenerator, UlidGenerator};
use crate::instrument::{dispatch_span, instrumented};
use crate::lock::LockService;
use crate::routing::TagRouter;
use bon::Builder;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

#[derive(Builder)]
pub struct OutboxDispatcher {
    store: Arc<dyn OutboxStore>,
    lock_service: Arc<dyn LockService>,
    broker: Arc<dyn BrokerClient>,
    router: TagRouter,
    #[builder(default)]
    config: DispatcherConfig,
    #[builder(default = Arc::new(UlidGenerator::new()))]
    id_generator: Arc<dyn IdGenerator>,
}

/// 一个投递周期的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub scanned: usize,
    pub sent: usize,
    /// 发送失败但仍保持 `WaitSend`，等待下个周期
    pub retried: usize,
    /// 本周期进入 `SendFailed` 终态
    pub failed: usize,
    pub skipped_locked: usize,
    pub skipped_stale: usize,
    /// 存储/锁服务异常（已记录日志并吸收）
    pub errors: usize,
}

enum Outcome {
    Sent,
    Retried,
    Failed,
    SkippedLocked,
    SkippedStale,
}

impl OutboxDispatcher {
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// 执行一个完整的投递周期；错误只记录不上抛
    pub async fn dispatch_once(&self, ctx: &TraceContext) -> DispatchReport {
        instrumented(dispatch_span(ctx), self.run_cycle()).await
    }

    async fn run_cycle(&self) -> DispatchReport {
        let mut report = DispatchReport::default();

        let records = match self.store.find_all_by_status(OutboxStatus::WaitSend).await {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, "failed to scan outbox");
                report.errors += 1;
                return report;
            }
        };

        report.scanned = records.len();
        if records.len() > self.config.backlog_warn_threshold {
            warn!(
                backlog = records.len(),
                threshold = self.config.backlog_warn_threshold,
                "outbox backlog above threshold"
            );
        }

        for record in records {
            match self.dispatch_record(record.id()).await {
                Ok(Outcome::Sent) => report.sent += 1,
                Ok(Outcome::Retried) => report.retried += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::SkippedLocked) => report.skipped_locked += 1,
                Ok(Outcome::SkippedStale) => report.skipped_stale += 1,
                Err(err) => {
                    warn!(record_id = record.id(), error = %err, "outbox record dispatch aborted");
                    report.errors += 1;
                }
            }
        }

        if report.scanned > 0 {
            debug!(?report, "outbox dispatch cycle finished");
        }
        report
    }

    async fn dispatch_record(&self, id: i64) -> EvbusResult<Outcome> {
        let lock_key = format!("evbus:outbox:{id}");
        let Some(token) = self
            .lock_service
            .try_acquire(&lock_key, self.config.lock_ttl)
            .await?
        else {
            debug!(record_id = id, "outbox record locked elsewhere, skipped");
            return Ok(Outcome::SkippedLocked);
        };

        let outcome = self.send_locked(id).await;

        if let Err(err) = self.lock_service.release(token).await {
            warn!(record_id = id, error = %err, "failed to release outbox record lock");
        }
        outcome
    }

    async fn send_locked(&self, id: i64) -> EvbusResult<Outcome> {
        // 重读：扫描与加锁之间可能已被其他实例处理
        let Some(record) = self.store.find_by_id(id).await? else {
            return Ok(Outcome::SkippedStale);
        };
        if record.status() != OutboxStatus::WaitSend {
            return Ok(Outcome::SkippedStale);
        }

        let now = Utc::now();
        let message = self.build_message(&record, now)?;
        let count = record.count() + 1;

        match self.broker.send(message).await {
            Ok(receipt) => {
                self.update(DeliveryUpdate {
                    id,
                    status: OutboxStatus::SendSuccess,
                    count,
                    publish_time: Some(now),
                    update_time: Utc::now(),
                })
                .await?;
                debug!(
                    record_id = id,
                    event_key = record.event_key(),
                    msg_id = %receipt.msg_id,
                    "outbox record sent"
                );
                Ok(Outcome::Sent)
            }
            Err(err) if count >= self.config.max_attempts => {
                self.update(DeliveryUpdate {
                    id,
                    status: OutboxStatus::SendFailed,
                    count,
                    publish_time: None,
                    update_time: Utc::now(),
                })
                .await?;
                error!(
                    record_id = id,
                    event_key = record.event_key(),
                    event_type = record.event_type(),
                    count,
                    error = %err,
                    "outbox record gave up after max attempts"
                );
                Ok(Outcome::Failed)
            }
            Err(err) => {
                self.update(DeliveryUpdate {
                    id,
                    status: OutboxStatus::WaitSend,
                    count,
                    publish_time: None,
                    update_time: Utc::now(),
                })
                .await?;
                warn!(
                    record_id = id,
                    event_key = record.event_key(),
                    count,
                    error = %err,
                    "outbox record send failed, will retry"
                );
                Ok(Outcome::Retried)
            }
        }
    }

    fn build_message(
        &self,
        record: &OutboxRecord,
        now: chrono::DateTime<Utc>,
    ) -> EvbusResult<OutboundMessage> {
        let mut envelope = record.envelope().clone();
        envelope.set_publish_time(now);

        let deliver_at = record.start_deliver_time().filter(|at| *at > now);

        Ok(OutboundMessage::builder()
            .topic(self.router.topic_for(&envelope))
            .tag(self.router.tag_for(envelope.event_type()))
            .key(envelope.key())
            .body(envelope.to_bytes()?)
            .maybe_deliver_at(deliver_at)
            .build())
    }

    async fn update(&self, update: DeliveryUpdate) -> EvbusResult<()> {
        let id = update.id;
        if !self.store.update_delivery(update).await? {
            warn!(record_id = id, "outbox record changed concurrently, update skipped");
        }
        Ok(())
    }

    /// 启动周期触发器
    pub fn start(self: Arc<Self>) -> DispatcherHandle {
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        info!(interval_ms = self.config.interval.as_millis() as u64, "outbox dispatcher started");

        let ticker = {
            let token = token.clone();
            let tracker = tracker.clone();
            let interval = self.config.interval;

            tokio::spawn(async move {
                let mut ticker = time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            let this = self.clone();
                            let ctx = TraceContext::with_trace_id(this.id_generator.next_id());
                            tracker.spawn(async move {
                                this.dispatch_once(&ctx).await;
                            });
                        }
                    }
                }
            })
        };

        DispatcherHandle {
            token,
            tracker,
            ticker: Some(ticker),
        }
    }
}

/// 投递器运行句柄：停止触发并等待在途周期结束
pub struct DispatcherHandle {
    token: CancellationToken,
    tracker: TaskTracker,
    ticker: Option<JoinHandle<()>>,
}

impl DispatcherHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// 等待触发器退出并排空在途的投递周期
    pub async fn join(mut self) {
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.await;
        }
        self.tracker.close();
        self.tracker.wait().await;
        info!("outbox dispatcher stopped");
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
