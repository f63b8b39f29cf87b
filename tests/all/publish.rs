use crate::helpers::{driver, order_delivery, Call, FakeBroker, Order};
use carrot_cake_driver::codec::{JsonCodec, MessageCodec};
use carrot_cake_driver::consumers::MessageDelivery;
use carrot_cake_driver::driver::ErrorKind;
use carrot_cake_driver::publishers::MessagePublication;
use fake::{Fake, Faker};
use std::error::Error;

#[tokio::test]
async fn publish_passes_flags_and_coordinates_through() {
    // Arrange
    let broker = FakeBroker::new();
    let mut driver = driver(&broker);
    let publication = MessagePublication::persistent(Order { id: 42 });

    // Act
    driver
        .publish(publication, "events", "order.created")
        .await
        .unwrap();

    // Assert
    let commands = broker.commands();
    let Some(Call::Publish {
        exchange,
        routing_key,
        mandatory,
        immediate,
        delivery_mode,
        payload,
    }) = commands.last()
    else {
        panic!("Expected a publish, got {commands:?}");
    };
    assert_eq!(exchange, "events");
    assert_eq!(routing_key, "order.created");
    assert!(!mandatory);
    assert!(!immediate);
    assert_eq!(*delivery_mode, Some(2));
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(payload).unwrap(),
        serde_json::json!({ "id": 42 })
    );
}

#[tokio::test]
async fn mandatory_and_transient_flags_are_honoured() {
    let broker = FakeBroker::new();
    let mut driver = driver(&broker);
    let exchange: String = Faker.fake();
    let routing_key: String = Faker.fake();
    let publication = MessagePublication::transient(Order { id: 1 }).with_mandatory(true);

    driver
        .publish(publication, &exchange, &routing_key)
        .await
        .unwrap();

    assert!(matches!(
        broker.commands().last(),
        Some(Call::Publish {
            mandatory: true,
            immediate: false,
            delivery_mode: Some(1),
            ..
        })
    ));
}

#[tokio::test]
async fn a_failed_publish_surfaces_as_publish_failed() {
    let broker = FakeBroker::new();
    broker.fail("publish");
    let mut driver = driver(&broker);

    let error = driver
        .publish(
            MessagePublication::persistent(Order { id: 42 }),
            "events",
            "order.created",
        )
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::PublishFailed);
    assert_eq!(
        error.to_string(),
        "Failed to publish a message to exchange `events` with routing key `order.created`"
    );
    assert_eq!(
        error.source().unwrap().to_string(),
        "publish failed: connection reset by peer"
    );
}

#[tokio::test]
async fn failing_to_get_a_connection_is_reported_as_the_operation_failure() {
    let broker = FakeBroker::new();
    broker.fail("get_connection");
    let mut driver = driver(&broker);

    let error = driver
        .publish(
            MessagePublication::persistent(Order { id: 42 }),
            "events",
            "order.created",
        )
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::PublishFailed);
}

#[tokio::test]
async fn operations_share_one_channel_until_it_is_closed() {
    // Arrange
    let broker = FakeBroker::new();
    let mut driver = driver(&broker);

    // Act
    for id in 0..3 {
        driver
            .publish(
                MessagePublication::persistent(Order { id }),
                "events",
                "order.created",
            )
            .await
            .unwrap();
    }
    driver.close().await.unwrap();
    driver
        .publish(
            MessagePublication::persistent(Order { id: 3 }),
            "events",
            "order.created",
        )
        .await
        .unwrap();

    // Assert
    let commands = broker.commands();
    let opened: Vec<_> = commands
        .iter()
        .filter(|call| matches!(call, Call::OpenChannel(_)))
        .collect();
    assert_eq!(opened, vec![&Call::OpenChannel(1), &Call::OpenChannel(2)]);
    assert!(commands.contains(&Call::CloseChannel(1)));
}

#[tokio::test]
async fn closing_without_a_channel_is_a_no_op() {
    let broker = FakeBroker::new();
    let mut driver = driver(&broker);

    driver.close().await.unwrap();

    assert!(broker.commands().is_empty());
}

#[tokio::test]
async fn a_failed_close_surfaces_as_close_failed() {
    let broker = FakeBroker::new();
    broker.fail("close");
    let mut driver = driver(&broker);
    driver
        .publish(
            MessagePublication::persistent(Order { id: 1 }),
            "events",
            "order.created",
        )
        .await
        .unwrap();

    let error = driver.close().await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::CloseFailed);
}

fn decoded(delivery_tag: u64) -> MessageDelivery<Order> {
    JsonCodec::<Order>::new("order")
        .decode(order_delivery(delivery_tag, 1), "orders")
        .unwrap()
}

#[tokio::test]
async fn ack_and_reject_use_the_delivery_tag() {
    let broker = FakeBroker::new();
    let mut driver = driver(&broker);

    driver.ack(&decoded(7)).await.unwrap();
    driver.reject(&decoded(8)).await.unwrap();

    let commands = broker.commands();
    assert!(commands.contains(&Call::Ack(7)));
    assert!(commands.contains(&Call::Reject {
        delivery_tag: 8,
        requeue: true,
    }));
}

#[tokio::test]
async fn ack_and_reject_failures_have_their_own_kinds() {
    let broker = FakeBroker::new();
    broker.fail("ack");
    broker.fail("reject");
    let mut driver = driver(&broker);

    let ack_error = driver.ack(&decoded(7)).await.unwrap_err();
    let reject_error = driver.reject(&decoded(8)).await.unwrap_err();

    assert_eq!(ack_error.kind(), ErrorKind::AckFailed);
    assert_eq!(ack_error.to_string(), "Failed to ack delivery 7");
    assert_eq!(reject_error.kind(), ErrorKind::RejectFailed);
    assert_eq!(reject_error.to_string(), "Failed to reject delivery 8");
}
