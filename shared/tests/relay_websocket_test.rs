// ============================================================================
// WebSocket Relay Tests
// ============================================================================

use bridge_config::TransportKind;

mod test_utils;
use test_utils::{agent_config, eventually, register_agent, spawn_cloud};

#[tokio::test]
async fn test_echo_round_trip() {
    let cloud = spawn_cloud().await;
    let agent = register_agent(agent_config(&cloud, TransportKind::WebSocket))
        .await
        .unwrap();
    agent.start().await;

    let reply = agent.echo("ping", "resp.1").await.expect("no reply");
    assert_eq!(
        reply.text(),
        format!("ping | client:{} | server:cloud | handler", agent.location_id)
    );

    // Several messages over the same socket
    for i in 0..5 {
        let subject = format!("resp.batch.{}", i);
        let reply = agent.echo(&format!("m{}", i), &subject).await.expect("no reply");
        assert!(reply.text().starts_with(&format!("m{} | client:", i)));
    }

    agent.stop().await;
}

#[tokio::test]
async fn test_upgrade_rejected_until_rotated() {
    let cloud = spawn_cloud().await;
    let agent = register_agent(agent_config(&cloud, TransportKind::WebSocket))
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

    let reply = agent.echo("ping", "resp.1").await.expect("no reply after rotation");
    assert!(reply.text().ends_with("| server:cloud | handler"));

    agent.stop().await;
}

#[tokio::test]
async fn test_rotation_demanded_mid_session_resends_message() {
    let cloud = spawn_cloud().await;
    let agent = register_agent(agent_config(&cloud, TransportKind::WebSocket))
        .await
        .unwrap();
    agent.start().await;

    let reply = agent.echo("warm-up", "resp.0").await.expect("no reply on live socket");
    assert!(reply.text().starts_with("warm-up | client:"));

    // The socket stays open; the next push frame trips the rotation gate
    let mut record = cloud.key_store.get(&agent.location_id).await.unwrap().unwrap();
    let old_key = record.public_key.clone();
    record.force_rotation = true;
    cloud.key_store.put(&agent.location_id, &record).await.unwrap();

    let reply = agent
        .echo("after-flip", "resp.1")
        .await
        .expect("message rejected by the rotation demand was not resent");
    assert_eq!(
        reply.text(),
        format!("after-flip | client:{} | server:cloud | handler", agent.location_id)
    );

    let on_cloud = cloud.key_store.get(&agent.location_id).await.unwrap().unwrap();
    let own = agent.key_store.get(&agent.location_id).await.unwrap().unwrap();
    assert!(!on_cloud.force_rotation);
    assert_ne!(on_cloud.public_key, old_key);
    assert_eq!(own.public_key, on_cloud.public_key);

    agent.stop().await;
}
