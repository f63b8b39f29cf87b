use carrot_cake_driver::amqp::{configuration::RabbitMqSettings, ConnectionFactory, ExchangeKind};
use carrot_cake_driver::codec::JsonCodec;
use carrot_cake_driver::consumers::{ConsumeSession, DeliveryHandler, MessageDelivery};
use carrot_cake_driver::driver::AmqpDriver;
use carrot_cake_driver::publishers::MessagePublication;
use carrot_cake_driver::topology::{Binding, ExchangeDefinition, QueueDefinition};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
struct OrderCreated {
    order_id: u64,
}

struct PrintOrders;

#[async_trait::async_trait]
impl DeliveryHandler<OrderCreated, lapin::Channel> for PrintOrders {
    async fn handle(
        &mut self,
        session: &ConsumeSession<'_, lapin::Channel>,
        delivery: MessageDelivery<OrderCreated>,
    ) -> bool {
        println!("Received order {}", delivery.message.order_id);
        // Delivery tags are only valid on the channel of the consume session.
        if let Err(e) = session.ack(&delivery).await {
            eprintln!("Failed to ack: {e}");
            return false;
        }
        true
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The out-of-the-box parameters for the default RabbitMq Docker image.
    let settings = RabbitMqSettings::default();
    let connection_factory = ConnectionFactory::new_from_config(&settings)?;
    let mut driver = AmqpDriver::new(
        connection_factory,
        JsonCodec::<OrderCreated>::new("order.created"),
    );

    // The driver does not assume any topology: declare what we need.
    driver
        .declare_exchange(&ExchangeDefinition::durable("events", ExchangeKind::Topic))
        .await?;
    driver
        .declare_queue(&QueueDefinition::durable("orders"))
        .await?;
    driver
        .bind_queue(&Binding::new("events", "orders", "order.*"))
        .await?;

    for order_id in 0..3 {
        driver
            .publish(
                MessagePublication::persistent(OrderCreated { order_id }),
                "events",
                "order.created",
            )
            .await?;
    }

    // Consume until SIGTERM, 5 seconds without orders or a minute in total, whichever comes first.
    let _stop_on_sigterm = driver.stop_on_sigterm()?;
    driver
        .consume(
            "orders",
            &mut PrintOrders,
            Duration::from_secs(5),
            Some(Duration::from_secs(60)),
        )
        .await?;

    Ok(())
}
