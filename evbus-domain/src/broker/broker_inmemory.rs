//! 内存版 Broker（InMemoryBroker）
//!
//! 满足 `BrokerClient` 协议的轻量实现，模拟真实 Broker 的关键语义：
//! - 集群消费：同组成员轮询投递；组内暂无成员时消息暂存，成员上线后补投；
//! - 广播消费：每个匹配成员各投递一次；
//! - `RetryLater`（或未回执）后按固定间隔重投，超过最大重投次数进入死信；
//! - 延迟投递；
//! - 事务半消息：`check_transactions` 调用已注册的回查回调决定提交/回滚/保留。
//!
//! 另提供发送失败注入与已发送消息日志，便于测试断言。

use super::client::{BrokerClient, TransactionChecker};
use super::message::{
    ConsumeAck, ConsumeMode, Delivery, InboundMessage, OutboundMessage, SendReceipt,
    Subscription, TagFilter, TransactionResolution,
};
use crate::error::{EvbusError, EvbusResult};
use async_trait::async_trait;
use chrono::Utc;
use futures_core::stream::BoxStream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

/// 内存 Broker 配置
#[derive(Clone, Copy, Debug)]
pub struct InMemoryBrokerConfig {
    /// 消费失败后的重投间隔
    pub retry_delay: Duration,
    /// 最大重投次数，超过后进入死信
    pub max_reconsume_times: u32,
}

impl Default for InMemoryBrokerConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(50),
            max_reconsume_times: 16,
        }
    }
}

/// 简单的内存 Broker 实现，克隆后共享同一份状态
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    config: InMemoryBrokerConfig,
    groups: Mutex<HashMap<GroupKey, Group>>,
    half_messages: Mutex<Vec<(String, OutboundMessage)>>,
    checker: RwLock<Option<Arc<dyn TransactionChecker>>>,
    sent: Mutex<Vec<OutboundMessage>>,
    dead_letters: Mutex<Vec<InboundMessage>>,
    fail_next: AtomicUsize,
    unavailable: AtomicBool,
    send_attempts: AtomicUsize,
    seq: AtomicU64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct GroupKey {
    topic: String,
    group_id: String,
    mode: ConsumeMode,
}

#[derive(Default)]
struct Group {
    members: Vec<Member>,
    cursor: usize,
    /// 集群组暂无在线成员时积压的消息
    pending: Vec<InboundMessage>,
}

struct Member {
    id: u64,
    filter: TagFilter,
    tx: mpsc::UnboundedSender<Delivery>,
}

#[derive(Clone, Copy)]
enum Target {
    AnyMember,
    Member(u64),
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: InMemoryBrokerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                ..Default::default()
            }),
        }
    }

    /// 让接下来的 `n` 次发送失败
    pub fn fail_next_sends(&self, n: usize) {
        self.inner.fail_next.store(n, Ordering::SeqCst);
    }

    /// 模拟 Broker 整体不可用
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// 成功写入（含提交后的半消息）的消息日志
    pub fn sent_messages(&self) -> Vec<OutboundMessage> {
        guard(&self.inner.sent).clone()
    }

    /// 发送尝试次数（含失败）
    pub fn send_attempts(&self) -> usize {
        self.inner.send_attempts.load(Ordering::SeqCst)
    }

    pub fn dead_letters(&self) -> Vec<InboundMessage> {
        guard(&self.inner.dead_letters).clone()
    }

    pub fn pending_half_messages(&self) -> usize {
        guard(&self.inner.half_messages).len()
    }

    /// 模拟 Broker 对半消息的一轮回查，返回本轮已决（提交或回滚）的数量
    pub async fn check_transactions(&self) -> usize {
        let snapshot: Vec<(String, OutboundMessage)> = guard(&self.inner.half_messages).clone();
        let checker = self
            .inner
            .checker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut resolved = 0;
        for (msg_id, message) in snapshot {
            let resolution = match &checker {
                Some(checker) => checker.check(message.key()).await,
                None => TransactionResolution::Rollback,
            };
            debug!(key = message.key(), ?resolution, "half message checked");

            match resolution {
                TransactionResolution::Unknown => continue,
                TransactionResolution::Commit => {
                    guard(&self.inner.half_messages).retain(|(id, _)| id != &msg_id);
                    guard(&self.inner.sent).push(message.clone());
                    self.inner.schedule(msg_id, message);
                }
                TransactionResolution::Rollback => {
                    guard(&self.inner.half_messages).retain(|(id, _)| id != &msg_id);
                }
            }
            resolved += 1;
        }
        resolved
    }

    fn admit(&self) -> EvbusResult<String> {
        self.inner.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(EvbusError::broker("broker unavailable"));
        }
        let injected = self
            .inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(EvbusError::broker("injected send failure"));
        }
        Ok(uuid::Uuid::new_v4().to_string())
    }
}

impl Inner {
    /// 立即或延迟投递到所有订阅了该 topic 的消费组
    fn schedule(self: &Arc<Self>, msg_id: String, message: OutboundMessage) {
        let inbound = InboundMessage {
            msg_id,
            topic: message.topic().to_string(),
            tag: message.tag().to_string(),
            key: message.key().to_string(),
            body: message.body().to_vec(),
            reconsume_times: 0,
        };

        let delay = message
            .deliver_at()
            .and_then(|at| (at - Utc::now()).to_std().ok());

        match delay {
            Some(delay) if !delay.is_zero() => {
                let inner = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.route(inbound);
                });
            }
            _ => self.route(inbound),
        }
    }

    fn route(self: &Arc<Self>, message: InboundMessage) {
        let targets: Vec<(GroupKey, Vec<Target>)> = {
            let groups = guard(&self.groups);
            groups
                .iter()
                .filter(|(key, _)| key.topic == message.topic)
                .map(|(key, group)| {
                    let targets = match key.mode {
                        ConsumeMode::Clustering => vec![Target::AnyMember],
                        ConsumeMode::Broadcasting => group
                            .members
                            .iter()
                            .filter(|m| m.filter.matches(&message.tag))
                            .map(|m| Target::Member(m.id))
                            .collect(),
                    };
                    (key.clone(), targets)
                })
                .collect()
        };

        for (key, targets) in targets {
            for target in targets {
                self.deliver(&key, target, message.clone());
            }
        }
    }

    fn deliver(self: &Arc<Self>, key: &GroupKey, target: Target, message: InboundMessage) {
        let (ack_tx, ack_rx) = oneshot::channel();

        let member_id = {
            let mut groups = guard(&self.groups);
            let Some(group) = groups.get_mut(key) else {
                return;
            };
            group.members.retain(|m| !m.tx.is_closed());

            if group.members.is_empty() {
                if matches!(target, Target::AnyMember) {
                    group.pending.push(message);
                }
                return;
            }

            let candidates: Vec<usize> = group
                .members
                .iter()
                .enumerate()
                .filter(|(_, m)| m.filter.matches(&message.tag))
                .filter(|(_, m)| match target {
                    Target::AnyMember => true,
                    Target::Member(id) => m.id == id,
                })
                .map(|(i, _)| i)
                .collect();

            if candidates.is_empty() {
                return;
            }

            let idx = candidates[group.cursor % candidates.len()];
            group.cursor = group.cursor.wrapping_add(1);
            let member = &group.members[idx];
            if member
                .tx
                .send(Delivery::new(message.clone(), ack_tx))
                .is_err()
            {
                if matches!(target, Target::AnyMember) {
                    group.pending.push(message);
                }
                return;
            }
            member.id
        };

        let inner = self.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let ack = ack_rx.await.unwrap_or(ConsumeAck::RetryLater);
            if ack == ConsumeAck::Commit {
                return;
            }

            let mut retry = message;
            retry.reconsume_times += 1;
            if retry.reconsume_times > inner.config.max_reconsume_times {
                warn!(key = %retry.key, tag = %retry.tag, group = %key.group_id, "message moved to dead letter queue");
                guard(&inner.dead_letters).push(retry);
                return;
            }

            tokio::time::sleep(inner.config.retry_delay).await;
            let target = match key.mode {
                ConsumeMode::Clustering => Target::AnyMember,
                ConsumeMode::Broadcasting => Target::Member(member_id),
            };
            inner.deliver(&key, target, retry);
        });
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn send(&self, message: OutboundMessage) -> EvbusResult<SendReceipt> {
        let msg_id = self.admit()?;
        guard(&self.inner.sent).push(message.clone());
        let receipt = SendReceipt {
            msg_id: msg_id.clone(),
            topic: message.topic().to_string(),
        };
        self.inner.schedule(msg_id, message);
        Ok(receipt)
    }

    async fn send_transactional(&self, message: OutboundMessage) -> EvbusResult<SendReceipt> {
        let msg_id = self.admit()?;
        let receipt = SendReceipt {
            msg_id: msg_id.clone(),
            topic: message.topic().to_string(),
        };
        guard(&self.inner.half_messages).push((msg_id, message));
        Ok(receipt)
    }

    fn register_transaction_checker(&self, checker: Arc<dyn TransactionChecker>) {
        *self
            .inner
            .checker
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(checker);
    }

    async fn subscribe(
        &self,
        subscription: Subscription,
    ) -> EvbusResult<BoxStream<'static, Delivery>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = GroupKey {
            topic: subscription.topic,
            group_id: subscription.group_id,
            mode: subscription.mode,
        };

        let backlog = {
            let mut groups = guard(&self.inner.groups);
            let group = groups.entry(key.clone()).or_default();
            group.members.push(Member {
                id: self.inner.seq.fetch_add(1, Ordering::SeqCst),
                filter: subscription.filter,
                tx,
            });
            std::mem::take(&mut group.pending)
        };

        for message in backlog {
            self.inner.deliver(&key, Target::AnyMember, message);
        }

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}
