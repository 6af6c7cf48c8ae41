//! HTTP-managed services against real containers.

use testbed_core::ports::NoopLogger;
use testbed_services::{ClickHouse, Maildev, RabbitMq, ServiceKind};
use testbed_tests::TestEnvironment;

#[tokio::test]
#[ignore = "requires docker"]
async fn test_clickhouse_database() {
    let test = TestEnvironment::start(&[ServiceKind::ClickHouse])
        .await
        .expect("start environment");

    let db = ClickHouse::new(test.ctx.clone()).get().await.unwrap();
    let found = db
        .execute(&format!(
            "SELECT count() FROM system.databases WHERE name = '{}'",
            db.database
        ))
        .await
        .unwrap();
    assert_eq!(found.trim(), "1");

    assert!(test.env.cleanup().run_all(&NoopLogger).await.is_clean());
    test.stop().await.expect("stop environment");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_rabbitmq_vhost_and_maildev() {
    let test = TestEnvironment::start(&[ServiceKind::RabbitMq, ServiceKind::Maildev])
        .await
        .expect("start environment");

    let vhost = RabbitMq::new(test.ctx.clone()).get().await.unwrap();
    assert!(vhost.amqp_url().ends_with(&vhost.vhost));

    let mailbox = Maildev::new(test.ctx.clone()).get().await.unwrap();
    assert!(mailbox.messages().await.unwrap().is_empty());

    test.stop().await.expect("stop environment");
}
