//! An in-memory broker that records every call the driver makes and replays scripted
//! consumer activity.
use carrot_cake_driver::amqp::configuration::ConsumerSettings;
use carrot_cake_driver::amqp::options::{
    BasicPublishOptions, ExchangeDeleteOptions, QueueDeleteOptions,
};
use carrot_cake_driver::codec::{JsonCodec, MessageCodec};
use carrot_cake_driver::consumers::{ConsumeSession, DeliveryHandler, MessageDelivery};
use carrot_cake_driver::driver::AmqpDriver;
use carrot_cake_driver::topology::{Binding, ExchangeDefinition, QueueDefinition, QueueState};
use carrot_cake_driver::transport::{
    Channel, Connection, ConnectionProvider, Consumer, ConsumerTag, Readiness, WaitError,
    WaitTimeout, WireDelivery, WireMessage,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub const ORDER_TYPE: &str = "order";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u32,
}

pub type TestDriver = AmqpDriver<FakeBroker, JsonCodec<Order>>;

pub fn driver(broker: &FakeBroker) -> TestDriver {
    AmqpDriver::new(broker.clone(), JsonCodec::new(ORDER_TYPE))
}

/// What the driver asked the broker to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetConnection,
    OpenChannel(usize),
    CloseChannel(usize),
    Publish {
        exchange: String,
        routing_key: String,
        mandatory: bool,
        immediate: bool,
        delivery_mode: Option<u8>,
        payload: Vec<u8>,
    },
    RegisterConsumer {
        queue: String,
        settings: ConsumerSettings,
    },
    Wait(WaitTimeout),
    CancelConsumer {
        tag: String,
        no_wait: bool,
    },
    Ack(u64),
    Reject {
        delivery_tag: u64,
        requeue: bool,
    },
    DeclareExchange(ExchangeDefinition),
    BindExchange(Binding),
    UnbindExchange(Binding),
    DeleteExchange {
        name: String,
        options: ExchangeDeleteOptions,
    },
    DeclareQueue {
        definition: QueueDefinition,
        passive: bool,
    },
    BindQueue(Binding),
    UnbindQueue(Binding),
    PurgeQueue(String),
    DeleteQueue {
        name: String,
        options: QueueDeleteOptions,
    },
}

/// What the consumer's next wait for activity does.
pub enum Step {
    /// Return these deliveries straight away.
    Deliver(Vec<WireDelivery>),
    /// Return these deliveries after some time, unless the wait times out first.
    DeliverAfter(Duration, Vec<WireDelivery>),
    /// Fail the wait.
    Fail(WaitError),
    /// Wait until the consumer is cancelled, then report the end of the delivery stream.
    UntilCancelled,
}

#[derive(Default)]
struct BrokerState {
    calls: Vec<Call>,
    script: VecDeque<Step>,
    failing: HashSet<&'static str>,
    channels_opened: usize,
    queue_state: QueueState,
    purged: u32,
}

/// A broker living in memory.
///
/// Once the script is exhausted, an indefinite wait reports the end of the delivery stream
/// and a bounded wait sleeps for its whole budget before reporting that nothing is ready.
#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<BrokerState>>,
    cancelled: Arc<Notify>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, steps: impl IntoIterator<Item = Step>) {
        self.state.lock().script.extend(steps);
    }

    /// Make every call to `operation` fail, e.g. `"publish"` or `"close"`.
    pub fn fail(&self, operation: &'static str) {
        self.state.lock().failing.insert(operation);
    }

    pub fn set_queue_state(&self, state: QueueState) {
        self.state.lock().queue_state = state;
    }

    pub fn set_purged(&self, purged: u32) {
        self.state.lock().purged = purged;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// The recorded calls, without the waits.
    pub fn commands(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::Wait(_)))
            .collect()
    }

    pub fn waits(&self) -> Vec<WaitTimeout> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Wait(timeout) => Some(timeout),
                _ => None,
            })
            .collect()
    }

    fn record(&self, operation: &'static str, call: Call) -> Result<(), anyhow::Error> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.failing.contains(operation) {
            anyhow::bail!("{operation} failed: connection reset by peer");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConnectionProvider for FakeBroker {
    type Connection = FakeConnection;

    async fn get_connection(&self) -> Result<FakeConnection, anyhow::Error> {
        self.record("get_connection", Call::GetConnection)?;
        Ok(FakeConnection {
            broker: self.clone(),
        })
    }
}

pub struct FakeConnection {
    broker: FakeBroker,
}

#[async_trait::async_trait]
impl Connection for FakeConnection {
    type Channel = FakeChannel;

    async fn open_channel(&self) -> Result<FakeChannel, anyhow::Error> {
        let id = {
            let mut state = self.broker.state.lock();
            state.channels_opened += 1;
            state.channels_opened
        };
        self.broker.record("open_channel", Call::OpenChannel(id))?;
        Ok(FakeChannel {
            broker: self.broker.clone(),
            id,
            open: Arc::new(Mutex::new(true)),
        })
    }
}

#[derive(Clone)]
pub struct FakeChannel {
    broker: FakeBroker,
    id: usize,
    open: Arc<Mutex<bool>>,
}

impl FakeChannel {
    /// Simulate the broker closing the channel, e.g. after a failed method.
    pub fn close_from_broker(&self) {
        *self.open.lock() = false;
    }
}

#[async_trait::async_trait]
impl Channel for FakeChannel {
    type Consumer = FakeConsumer;

    fn is_open(&self) -> bool {
        *self.open.lock()
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        options: BasicPublishOptions,
        message: WireMessage,
    ) -> Result<(), anyhow::Error> {
        self.broker.record(
            "publish",
            Call::Publish {
                exchange: exchange.to_owned(),
                routing_key: routing_key.to_owned(),
                mandatory: options.mandatory,
                immediate: options.immediate,
                delivery_mode: *message.properties.delivery_mode(),
                payload: message.payload,
            },
        )
    }

    async fn register_consumer(
        &self,
        queue: &str,
        settings: &ConsumerSettings,
    ) -> Result<FakeConsumer, anyhow::Error> {
        self.broker.record(
            "register_consumer",
            Call::RegisterConsumer {
                queue: queue.to_owned(),
                settings: settings.clone(),
            },
        )?;
        Ok(FakeConsumer {
            broker: self.broker.clone(),
            tag: format!("ctag-{}", self.id).into(),
            ready: Vec::new(),
        })
    }

    async fn cancel_consumer(
        &self,
        tag: &ConsumerTag,
        no_wait: bool,
    ) -> Result<(), anyhow::Error> {
        let result = self.broker.record(
            "cancel_consumer",
            Call::CancelConsumer {
                tag: tag.to_string(),
                no_wait,
            },
        );
        self.broker.cancelled.notify_one();
        result
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), anyhow::Error> {
        self.broker.record("ack", Call::Ack(delivery_tag))
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), anyhow::Error> {
        self.broker.record(
            "reject",
            Call::Reject {
                delivery_tag,
                requeue,
            },
        )
    }

    async fn declare_exchange(
        &self,
        definition: &ExchangeDefinition,
    ) -> Result<(), anyhow::Error> {
        self.broker
            .record("declare_exchange", Call::DeclareExchange(definition.clone()))
    }

    async fn bind_exchange(&self, binding: &Binding) -> Result<(), anyhow::Error> {
        self.broker
            .record("bind_exchange", Call::BindExchange(binding.clone()))
    }

    async fn unbind_exchange(&self, binding: &Binding) -> Result<(), anyhow::Error> {
        self.broker
            .record("unbind_exchange", Call::UnbindExchange(binding.clone()))
    }

    async fn delete_exchange(
        &self,
        name: &str,
        options: ExchangeDeleteOptions,
    ) -> Result<(), anyhow::Error> {
        self.broker.record(
            "delete_exchange",
            Call::DeleteExchange {
                name: name.to_owned(),
                options,
            },
        )
    }

    async fn declare_queue(
        &self,
        definition: &QueueDefinition,
        passive: bool,
    ) -> Result<QueueState, anyhow::Error> {
        self.broker.record(
            "declare_queue",
            Call::DeclareQueue {
                definition: definition.clone(),
                passive,
            },
        )?;
        Ok(self.broker.state.lock().queue_state)
    }

    async fn bind_queue(&self, binding: &Binding) -> Result<(), anyhow::Error> {
        self.broker
            .record("bind_queue", Call::BindQueue(binding.clone()))
    }

    async fn unbind_queue(&self, binding: &Binding) -> Result<(), anyhow::Error> {
        self.broker
            .record("unbind_queue", Call::UnbindQueue(binding.clone()))
    }

    async fn purge_queue(&self, name: &str) -> Result<u32, anyhow::Error> {
        self.broker
            .record("purge_queue", Call::PurgeQueue(name.to_owned()))?;
        Ok(self.broker.state.lock().purged)
    }

    async fn delete_queue(
        &self,
        name: &str,
        options: QueueDeleteOptions,
    ) -> Result<(), anyhow::Error> {
        self.broker.record(
            "delete_queue",
            Call::DeleteQueue {
                name: name.to_owned(),
                options,
            },
        )
    }

    async fn close(&self) -> Result<(), anyhow::Error> {
        *self.open.lock() = false;
        self.broker.record("close", Call::CloseChannel(self.id))
    }
}

pub struct FakeConsumer {
    broker: FakeBroker,
    tag: ConsumerTag,
    ready: Vec<WireDelivery>,
}

#[async_trait::async_trait]
impl Consumer for FakeConsumer {
    fn tag(&self) -> &ConsumerTag {
        &self.tag
    }

    async fn wait_for_activity(&mut self, timeout: WaitTimeout) -> Result<Readiness, WaitError> {
        self.broker.state.lock().calls.push(Call::Wait(timeout));
        let step = self.broker.state.lock().script.pop_front();

        match (step, timeout) {
            (Some(Step::Deliver(deliveries)), _) => {
                self.ready.extend(deliveries);
                Ok(Readiness::Ready(self.ready.len()))
            }
            (Some(Step::DeliverAfter(delay, deliveries)), WaitTimeout::Bounded(timeout))
                if delay > timeout =>
            {
                tokio::time::sleep(timeout).await;
                // Not consumed: it is still on its way.
                let remaining = delay - timeout;
                self.broker
                    .state
                    .lock()
                    .script
                    .push_front(Step::DeliverAfter(remaining, deliveries));
                Ok(Readiness::Idle)
            }
            (Some(Step::DeliverAfter(delay, deliveries)), _) => {
                tokio::time::sleep(delay).await;
                self.ready.extend(deliveries);
                Ok(Readiness::Ready(self.ready.len()))
            }
            (Some(Step::Fail(error)), _) => Err(error),
            (Some(Step::UntilCancelled), _) => {
                self.broker.cancelled.notified().await;
                Err(WaitError::without_detail())
            }
            (None, WaitTimeout::Bounded(timeout)) => {
                tokio::time::sleep(timeout).await;
                Ok(Readiness::Idle)
            }
            (None, WaitTimeout::Indefinite) => Err(WaitError::without_detail()),
        }
    }

    async fn process_one_wait_cycle(&mut self) -> Result<Vec<WireDelivery>, anyhow::Error> {
        Ok(std::mem::take(&mut self.ready))
    }
}

/// A delivery of `Order { id }`, as published by the driver's codec.
pub fn order_delivery(delivery_tag: u64, id: u32) -> WireDelivery {
    let message = JsonCodec::<Order>::new(ORDER_TYPE)
        .encode(&Order { id }, true)
        .unwrap();
    WireDelivery {
        delivery_tag,
        exchange: "events".into(),
        routing_key: "order.created".into(),
        redelivered: false,
        properties: message.properties,
        data: message.payload,
    }
}

/// A handler that acks every delivery it sees.
///
/// It asks to stop once it has seen `stop_after` deliveries, if set.
#[derive(Default)]
pub struct AckingHandler {
    pub seen: Vec<MessageDelivery<Order>>,
    pub stop_after: Option<usize>,
    /// How long handling a delivery takes.
    pub processing_time: Option<Duration>,
}

impl AckingHandler {
    pub fn stopping_after(deliveries: usize) -> Self {
        Self {
            stop_after: Some(deliveries),
            ..Self::default()
        }
    }

    pub fn seen_ids(&self) -> Vec<u32> {
        self.seen.iter().map(|delivery| delivery.message.id).collect()
    }
}

#[async_trait::async_trait]
impl DeliveryHandler<Order, FakeChannel> for AckingHandler {
    async fn handle(
        &mut self,
        session: &ConsumeSession<'_, FakeChannel>,
        delivery: MessageDelivery<Order>,
    ) -> bool {
        if let Some(processing_time) = self.processing_time {
            tokio::time::sleep(processing_time).await;
        }
        session.ack(&delivery).await.unwrap();
        self.seen.push(delivery);
        Some(self.seen.len()) != self.stop_after
    }
}
