// ============================================================================
// REST Relay Tests
// ============================================================================
//
// Agent and cloud over the batched push / long-poll transport:
// - request/reply round trip through both buses
// - forced rotation and age-based rotation
// - start/stop bookkeeping
//
// ============================================================================

use std::time::Duration;

use bridge_config::TransportKind;
use bridge_shared::relay::TransportError;

mod test_utils;
use test_utils::{agent_config, cloud_config, eventually, register_agent, spawn_cloud, spawn_cloud_with};

#[tokio::test]
async fn test_echo_round_trip() {
    let cloud = spawn_cloud().await;
    let agent = register_agent(agent_config(&cloud, TransportKind::Rest))
        .await
        .unwrap();
    agent.start().await;

    let reply = agent.echo("ping", "resp.1").await.expect("no reply");
    assert_eq!(
        reply.text(),
        format!("ping | client:{} | server:cloud | handler", agent.location_id)
    );

    agent.stop().await;
}

#[tokio::test]
async fn test_registration_stores_both_sides() {
    let cloud = spawn_cloud().await;
    let agent = register_agent(agent_config(&cloud, TransportKind::Rest))
        .await
        .unwrap();

    let on_cloud = cloud.key_store.get(&agent.location_id).await.unwrap().unwrap();
    assert!(on_cloud.private_key.is_none());
    assert_eq!(on_cloud.metadata.get("premID").map(String::as_str), Some("plant-1"));

    let own = agent.key_store.get(&agent.location_id).await.unwrap().unwrap();
    assert_eq!(own.public_key, on_cloud.public_key);
    assert!(own.private_key.is_some());

    let cloud_public = agent.key_store.get("cloud").await.unwrap().unwrap();
    let cloud_own = cloud.key_store.get("cloud").await.unwrap().unwrap();
    assert_eq!(cloud_public.public_key, cloud_own.public_key);

    // The cloud opened a subscription for the new client
    assert!(cloud
        .context
        .subscriptions
        .subscription_for_client(&agent.location_id)
        .await
        .is_some());
}

#[tokio::test]
async fn test_forced_rotation_before_relaying() {
    let cloud = spawn_cloud().await;
    let agent = register_agent(agent_config(&cloud, TransportKind::Rest))
        .await
        .unwrap();

    let mut record = cloud.key_store.get(&agent.location_id).await.unwrap().unwrap();
    let old_key = record.public_key.clone();
    record.force_rotation = true;
    cloud.key_store.put(&agent.location_id, &record).await.unwrap();

    agent.start().await;

    eventually(|| async {
        let on_cloud = cloud.key_store.get(&agent.location_id).await.unwrap().unwrap();
        let own = agent.key_store.get(&agent.location_id).await.unwrap().unwrap();
        !on_cloud.force_rotation && on_cloud.public_key != old_key && own.public_key == on_cloud.public_key
    })
    .await;

    let on_cloud = cloud.key_store.get(&agent.location_id).await.unwrap().unwrap();
    assert_eq!(on_cloud.metadata.get("premID").map(String::as_str), Some("plant-1"));

    let reply = agent.echo("ping", "resp.1").await.expect("no reply after rotation");
    assert!(reply.text().ends_with("| handler"));

    agent.stop().await;
}

#[tokio::test]
async fn test_rotation_after_timeout() {
    let mut config = cloud_config();
    config.security.rotation_timeout = Some(Duration::from_secs(3600));
    let cloud = spawn_cloud_with(config).await;
    let agent = register_agent(agent_config(&cloud, TransportKind::Rest))
        .await
        .unwrap();

    let mut record = cloud.key_store.get(&agent.location_id).await.unwrap().unwrap();
    let stale = chrono::Utc::now() - chrono::Duration::hours(2);
    record.last_key_rotation_time = stale;
    cloud.key_store.put(&agent.location_id, &record).await.unwrap();

    agent.start().await;

    eventually(|| async {
        let on_cloud = cloud.key_store.get(&agent.location_id).await.unwrap().unwrap();
        let own = agent.key_store.get(&agent.location_id).await.unwrap().unwrap();
        on_cloud.last_key_rotation_time > stale && own.public_key == on_cloud.public_key
    })
    .await;

    let reply = agent.echo("ping", "resp.2").await.expect("no reply after rotation");
    assert!(reply.text().starts_with("ping | client:"));

    agent.stop().await;
}

#[tokio::test]
async fn test_start_and_stop_are_tracked() {
    let cloud = spawn_cloud().await;
    let agent = register_agent(agent_config(&cloud, TransportKind::Rest))
        .await
        .unwrap();

    assert!(matches!(
        agent.transport.stop_message_handler().await,
        Err(TransportError::NotRunning)
    ));

    agent.start().await;
    assert!(matches!(
        agent.transport.start_message_handler(&agent.location_id).await,
        Err(TransportError::AlreadyRunning)
    ));

    agent.stop().await;
    // Restart after a clean stop
    agent.start().await;
    agent.stop().await;
}
