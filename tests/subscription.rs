mod helpers;

use helpers::recording_bus::RecordingBus;
use serde_json::{json, Value};
use slack_health::core::{BusMessage, ConfigAction, ConfigEvent, MessageBus};
use slack_health::internal_metrics::Metrics;
use slack_health::notification::test_utils::{FakeChatClient, FakeChatClientFactory};
use slack_health::runtime_config::ConfigMaterializer;
use slack_health::subscription::{ControllerState, SubscriptionController};
use std::sync::Arc;
use std::time::Duration;

fn create_controller(
    bus: &Arc<RecordingBus>,
    factory: &FakeChatClientFactory,
) -> SubscriptionController {
    SubscriptionController::new(
        bus.clone(),
        Arc::new(factory.clone()),
        ConfigMaterializer::default(),
        Metrics::new(),
    )
}

fn config_with_token(token: &str) -> Value {
    json!({
        "slack_api_token": token,
        "message_template": "{agent_identity} is {agent_status}",
        "agent_channel_config": { "ag1": ["#ops"] }
    })
}

#[tokio::test]
async fn test_incomplete_configuration_touches_nothing() {
    let bus = RecordingBus::new();
    let factory = FakeChatClientFactory::new(FakeChatClient::new());
    let mut controller = create_controller(&bus, &factory);

    for contents in [
        json!({}),
        json!({ "slack_api_token": "xoxb-1" }),
        json!({ "agent_channel_config": { "ag1": ["#ops"] } }),
        json!({ "slack_api_token": "", "agent_channel_config": { "ag1": ["#ops"] } }),
    ] {
        assert!(!controller.configure(&contents).await.unwrap());
    }

    assert!(bus.calls().is_empty());
    assert!(factory.tokens().is_empty());
    assert_eq!(controller.state(), ControllerState::Unconfigured);
}

#[tokio::test]
async fn test_every_update_unsubscribes_before_subscribing() {
    let bus = RecordingBus::new();
    let client = FakeChatClient::new();
    let factory = FakeChatClientFactory::new(client.clone());
    let mut controller = create_controller(&bus, &factory);

    let first = ConfigEvent::new("config", ConfigAction::New, config_with_token("xoxb-1"));
    let second = ConfigEvent::new("config", ConfigAction::Update, config_with_token("xoxb-1"));
    assert!(controller.handle_config_event(&first).await.unwrap());
    assert!(controller.handle_config_event(&second).await.unwrap());

    assert_eq!(
        bus.calls(),
        vec!["unsubscribe", "subscribe", "unsubscribe", "subscribe"]
    );
    assert_eq!(bus.subscription_count(), 1);

    // One live subscription means one delivery per alert.
    bus.publish(BusMessage::new("alerts/compass/ag1", "status: BAD"))
        .await
        .unwrap();
    client.wait_for_messages(1, Duration::from_secs(2)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        client.sent_messages(),
        vec![("#ops".to_string(), "ag1 is BAD".to_string())]
    );
}

#[tokio::test]
async fn test_credential_change_builds_client_with_new_token() {
    let bus = RecordingBus::new();
    let factory = FakeChatClientFactory::new(FakeChatClient::new());
    let mut controller = create_controller(&bus, &factory);

    controller.configure(&config_with_token("xoxb-old")).await.unwrap();
    controller.configure(&config_with_token("xoxb-new")).await.unwrap();

    assert_eq!(factory.tokens(), vec!["xoxb-old", "xoxb-new"]);
    assert_eq!(
        controller.current_pipeline().unwrap().config().token,
        "xoxb-new"
    );
}

#[tokio::test]
async fn test_incomplete_update_keeps_previous_subscription() {
    let bus = RecordingBus::new();
    let client = FakeChatClient::new();
    let factory = FakeChatClientFactory::new(client.clone());
    let mut controller = create_controller(&bus, &factory);
    controller.configure(&config_with_token("xoxb-1")).await.unwrap();

    let update = ConfigEvent::new(
        "config",
        ConfigAction::Update,
        json!({ "slack_api_token": "xoxb-2", "agent_channel_config": {} }),
    );
    assert!(!controller.handle_config_event(&update).await.unwrap());

    assert_eq!(bus.calls(), vec!["unsubscribe", "subscribe"]);
    assert_eq!(controller.state(), ControllerState::Active);

    bus.publish(BusMessage::new("alerts/compass/ag1", "status: GOOD"))
        .await
        .unwrap();
    client.wait_for_messages(1, Duration::from_secs(2)).await;
    assert_eq!(client.sent_messages()[0].1, "ag1 is GOOD");
}

#[tokio::test]
async fn test_unsubscribe_failure_aborts_resubscription() {
    let bus = RecordingBus::new();
    let factory = FakeChatClientFactory::new(FakeChatClient::new());
    let mut controller = create_controller(&bus, &factory);
    bus.fail_unsubscribe(true);

    let result = controller.configure(&config_with_token("xoxb-1")).await;

    assert!(result.is_err());
    assert_eq!(bus.calls(), vec!["unsubscribe"]);
    assert_eq!(controller.state(), ControllerState::Unconfigured);
    assert!(controller.current_pipeline().is_none());
}

#[tokio::test]
async fn test_unsubscribe_failure_keeps_active_pipeline() {
    let bus = RecordingBus::new();
    let client = FakeChatClient::new();
    let factory = FakeChatClientFactory::new(client.clone());
    let mut controller = create_controller(&bus, &factory);
    controller.configure(&config_with_token("xoxb-1")).await.unwrap();

    bus.fail_unsubscribe(true);
    let mut rotated = config_with_token("xoxb-2");
    rotated["message_template"] = json!("rotated {agent_identity}");
    let result = controller.configure(&rotated).await;

    assert!(result.is_err());
    assert_eq!(bus.calls(), vec!["unsubscribe", "subscribe", "unsubscribe"]);
    assert_eq!(controller.state(), ControllerState::Active);
    assert_eq!(
        controller.current_pipeline().unwrap().config().token,
        "xoxb-1"
    );

    // The surviving subscription still renders with the previous template.
    bus.publish(BusMessage::new("alerts/compass/ag1", "status: GOOD"))
        .await
        .unwrap();
    client.wait_for_messages(1, Duration::from_secs(2)).await;
    assert_eq!(client.sent_messages()[0].1, "ag1 is GOOD");
}

#[tokio::test]
async fn test_alerts_stay_in_order_across_resubscribe() {
    let bus = RecordingBus::new();
    let client = FakeChatClient::new().delayed_on("first", Duration::from_millis(300));
    let factory = FakeChatClientFactory::new(client.clone());
    let mut controller = create_controller(&bus, &factory);
    let contents = json!({
        "slack_api_token": "xoxb-1",
        "message_template": "{agent_status}",
        "agent_channel_config": { "ag1": ["#ops"] }
    });

    controller.configure(&contents).await.unwrap();
    bus.publish(BusMessage::new("alerts/compass/ag1", "status: first"))
        .await
        .unwrap();
    controller.configure(&contents).await.unwrap();
    bus.publish(BusMessage::new("alerts/compass/ag1", "status: second"))
        .await
        .unwrap();

    client.wait_for_messages(2, Duration::from_secs(3)).await;
    let texts: Vec<String> = client
        .sent_messages()
        .into_iter()
        .map(|(_, text)| text)
        .collect();
    assert_eq!(texts, vec!["first", "second"]);
}

#[tokio::test]
async fn test_shutdown_waits_for_queued_alerts() {
    let bus = RecordingBus::new();
    let client = FakeChatClient::new().delayed_on("ag1 is BAD", Duration::from_millis(200));
    let factory = FakeChatClientFactory::new(client.clone());
    let mut controller = create_controller(&bus, &factory);
    controller.configure(&config_with_token("xoxb-1")).await.unwrap();

    bus.publish(BusMessage::new("alerts/compass/ag1", "status: BAD"))
        .await
        .unwrap();
    controller.shutdown().await;

    assert_eq!(
        client.sent_messages(),
        vec![("#ops".to_string(), "ag1 is BAD".to_string())]
    );
}

#[tokio::test]
async fn test_run_applies_events_until_shutdown() {
    let bus = RecordingBus::new();
    let client = FakeChatClient::new();
    let factory = FakeChatClientFactory::new(client.clone());
    let controller = create_controller(&bus, &factory);
    let (events_tx, events_rx) = tokio::sync::mpsc::channel(4);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(controller.run(events_rx, shutdown_rx));

    events_tx
        .send(ConfigEvent::new("config", ConfigAction::New, config_with_token("xoxb-1")))
        .await
        .unwrap();
    let subscribed = helpers::wait_until(Duration::from_secs(2), || {
        bus.subscription_count() == 1
    })
    .await;
    assert!(subscribed);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("controller should stop on shutdown")
        .unwrap();
    assert_eq!(bus.subscription_count(), 0);
}
