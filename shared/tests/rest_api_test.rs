// ============================================================================
// Cloud REST API Tests
// ============================================================================
//
// Raw HTTP against the cloud service:
// - GET  /health
// - POST /api/v1/register           (auth backend accept / reject)
// - POST /api/v1/certificate/rotate (rejections leave the stored key alone)
// - GET  /api/v1/message-queue      (challenge and rotation gate)
// - POST /api/v1/message-queue      (bad envelopes are dropped, not fatal)
//
// ============================================================================

use bridge_config::TransportKind;
use bridge_crypto::challenge::AuthChallenge;
use bridge_crypto::envelope::{self, Envelope};
use bridge_crypto::{parse_public_key_pem, KeyPair, RsaPublicKey};
use bridge_shared::subscriptions::publish_lifecycle;
use bridge_types::{
    BridgedMessage, PushRequest, PushResponse, RegistrationRequest, RegistrationResponse,
    RotationRequest, CHALLENGE_HEADER, CHALLENGE_SIGNATURE_HEADER, LOCATION_HEADER, ROTATE_PATH,
};
use reqwest::StatusCode;

mod test_utils;
use test_utils::{
    agent_config, eventually, register_agent, spawn_cloud, CloudApp, KEY_BITS, VALID_SECRET,
};

fn create_client() -> reqwest::Client {
    reqwest::Client::builder().build().unwrap()
}

async fn register_raw(cloud: &CloudApp, pair: &KeyPair, secret: &str) -> reqwest::Response {
    create_client()
        .post(format!("{}/api/v1/register", cloud.base_url))
        .json(&RegistrationRequest {
            prem_id: "plant-1".to_string(),
            user_id: "operator".to_string(),
            secret: secret.to_string(),
            public_key: pair.public_key_pem().unwrap(),
        })
        .send()
        .await
        .unwrap()
}

async fn pull(cloud: &CloudApp, location_id: &str, challenge: &AuthChallenge) -> reqwest::Response {
    create_client()
        .get(format!("{}/api/v1/message-queue?timeout=0", cloud.base_url))
        .header(LOCATION_HEADER, location_id)
        .header(CHALLENGE_HEADER, &challenge.challenge_text)
        .header(CHALLENGE_SIGNATURE_HEADER, &challenge.challenge_signature)
        .send()
        .await
        .unwrap()
}

async fn rotate(
    cloud: &CloudApp,
    location_id: &str,
    public_key_envelope: Envelope,
    challenge: AuthChallenge,
) -> reqwest::Response {
    create_client()
        .post(format!("{}{}", cloud.base_url, ROTATE_PATH))
        .json(&RotationRequest {
            prem_id: location_id.to_string(),
            public_key_envelope,
            auth_challenge: challenge,
        })
        .send()
        .await
        .unwrap()
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_reports_clients() {
    let cloud = spawn_cloud().await;
    let pair = KeyPair::generate(KEY_BITS).unwrap();
    assert_eq!(register_raw(&cloud, &pair, VALID_SECRET).await.status(), StatusCode::CREATED);

    let body: serde_json::Value = create_client()
        .get(format!("{}/health", cloud.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["cloudID"], "cloud");
    assert_eq!(body["clients"], 1);
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_registration_rejected_by_auth_backend() {
    let cloud = spawn_cloud().await;
    let pair = KeyPair::generate(KEY_BITS).unwrap();

    let response = register_raw(&cloud, &pair, "wrong").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(cloud.key_store.list_ids().await.unwrap() == vec!["cloud".to_string()]);
}

#[tokio::test]
async fn test_agent_registration_rejected() {
    let cloud = spawn_cloud().await;
    let mut config = agent_config(&cloud, TransportKind::Rest);
    config.registration.secret = "wrong".to_string();

    let err = register_agent(config).await.err().expect("registration should fail");
    assert!(format!("{:#}", err).contains("403"));
}

#[tokio::test]
async fn test_registration_validates_input() {
    let cloud = spawn_cloud().await;
    let response = create_client()
        .post(format!("{}/api/v1/register", cloud.base_url))
        .json(&RegistrationRequest {
            prem_id: "plant-1".to_string(),
            user_id: "operator".to_string(),
            secret: VALID_SECRET.to_string(),
            public_key: "not a pem".to_string(),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let pair = KeyPair::generate(KEY_BITS).unwrap();
    let response = create_client()
        .post(format!("{}/api/v1/register", cloud.base_url))
        .json(&RegistrationRequest {
            prem_id: String::new(),
            user_id: "operator".to_string(),
            secret: VALID_SECRET.to_string(),
            public_key: pair.public_key_pem().unwrap(),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Message queue gate
// ============================================================================

#[tokio::test]
async fn test_pull_gate() {
    let cloud = spawn_cloud().await;
    let pair = KeyPair::generate(KEY_BITS).unwrap();
    let registered: RegistrationResponse = register_raw(&cloud, &pair, VALID_SECRET)
        .await
        .json()
        .await
        .unwrap();
    let location_id = registered.location_id;

    // Valid challenge, nothing queued
    let challenge = AuthChallenge::new(pair.private_key()).unwrap();
    let response = pull(&cloud, &location_id, &challenge).await;
    assert_eq!(response.status(), StatusCode::OK);
    let messages: Vec<BridgedMessage> = response.json().await.unwrap();
    assert!(messages.is_empty());

    // Signed by someone else
    let stranger = KeyPair::generate(KEY_BITS).unwrap();
    let forged = AuthChallenge::new(stranger.private_key()).unwrap();
    assert_eq!(pull(&cloud, &location_id, &forged).await.status(), StatusCode::UNAUTHORIZED);

    // Unknown location
    assert_eq!(pull(&cloud, "loc-unknown", &challenge).await.status(), StatusCode::UNAUTHORIZED);

    // Stale timestamp
    let stale = AuthChallenge::with_text("2001-01-01T00:00:00Z", pair.private_key()).unwrap();
    assert_eq!(pull(&cloud, &location_id, &stale).await.status(), StatusCode::UNAUTHORIZED);

    // Forced rotation
    let mut record = cloud.key_store.get(&location_id).await.unwrap().unwrap();
    record.force_rotation = true;
    cloud.key_store.put(&location_id, &record).await.unwrap();
    assert_eq!(pull(&cloud, &location_id, &challenge).await.status().as_u16(), 495);

    // A bad challenge still wins over rotation
    assert_eq!(pull(&cloud, &location_id, &forged).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_push_drops_bad_envelopes() {
    let cloud = spawn_cloud().await;
    let pair = KeyPair::generate(KEY_BITS).unwrap();
    let registered: RegistrationResponse = register_raw(&cloud, &pair, VALID_SECRET)
        .await
        .json()
        .await
        .unwrap();

    let request = PushRequest {
        auth_challenge: AuthChallenge::new(pair.private_key()).unwrap(),
        messages: vec![BridgedMessage {
            client_id: registered.location_id.clone(),
            format_version: 1,
            envelope: "{}".to_string(),
        }],
    };
    let response = create_client()
        .post(format!("{}/api/v1/message-queue", cloud.base_url))
        .header(LOCATION_HEADER, &registered.location_id)
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: PushResponse = response.json().await.unwrap();
    assert_eq!(body.accepted, 0);
}

// ============================================================================
// Certificate rotation
// ============================================================================

#[tokio::test]
async fn test_rotation_rejections_keep_stored_key() {
    let cloud = spawn_cloud().await;
    let pair = KeyPair::generate(KEY_BITS).unwrap();
    let registered: RegistrationResponse = register_raw(&cloud, &pair, VALID_SECRET)
        .await
        .json()
        .await
        .unwrap();
    let location_id = registered.location_id;
    let cloud_key: RsaPublicKey = parse_public_key_pem(&registered.cloud_public_key).unwrap();
    let before = cloud.key_store.get(&location_id).await.unwrap().unwrap();

    let next = KeyPair::generate(KEY_BITS).unwrap();
    let next_pem = next.public_key_pem().unwrap();
    let seal_from = |sender: &str, plain: &[u8]| {
        envelope::seal(plain, sender, "cloud", pair.private_key(), &cloud_key).unwrap()
    };
    let fresh = || AuthChallenge::new(pair.private_key()).unwrap();

    // Stale challenge
    let stale = AuthChallenge::with_text("2001-01-01T00:00:00Z", pair.private_key()).unwrap();
    let response = rotate(&cloud, &location_id, seal_from(&location_id, next_pem.as_bytes()), stale).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Challenge signed by someone else
    let stranger = KeyPair::generate(KEY_BITS).unwrap();
    let forged = AuthChallenge::new(stranger.private_key()).unwrap();
    let response = rotate(&cloud, &location_id, seal_from(&location_id, next_pem.as_bytes()), forged).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Envelope claims a different sender
    let response = rotate(&cloud, &location_id, seal_from("loc-other", next_pem.as_bytes()), fresh()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Signature taken from another envelope
    let sealed = seal_from(&location_id, next_pem.as_bytes());
    let other = seal_from(&location_id, b"something else");
    let mut tampered = serde_json::to_value(&sealed).unwrap();
    tampered["signature"] = serde_json::Value::String(other.signature().to_string());
    let tampered: Envelope = serde_json::from_value(tampered).unwrap();
    let response = rotate(&cloud, &location_id, tampered, fresh()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Sealed payload is not a public key
    let response = rotate(&cloud, &location_id, seal_from(&location_id, b"not a pem"), fresh()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let after = cloud.key_store.get(&location_id).await.unwrap().unwrap();
    assert_eq!(after.public_key, before.public_key);
    assert_eq!(after.last_key_rotation_time, before.last_key_rotation_time);

    // A well-formed request still goes through
    let response = rotate(&cloud, &location_id, seal_from(&location_id, next_pem.as_bytes()), fresh()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let rotated = cloud.key_store.get(&location_id).await.unwrap().unwrap();
    assert_eq!(&parse_public_key_pem(&rotated.public_key).unwrap(), next.public_key());
    assert!(rotated.last_key_rotation_time > before.last_key_rotation_time);
}

#[tokio::test]
async fn test_pull_after_client_removed_is_not_found() {
    let cloud = spawn_cloud().await;
    let pair = KeyPair::generate(KEY_BITS).unwrap();
    let registered: RegistrationResponse = register_raw(&cloud, &pair, VALID_SECRET)
        .await
        .json()
        .await
        .unwrap();
    let location_id = registered.location_id;

    publish_lifecycle(
        &cloud.bus,
        cloud.context.config.subjects.client_removed(),
        &location_id,
    )
    .await
    .unwrap();
    eventually(|| async {
        cloud
            .context
            .subscriptions
            .subscription_for_client(&location_id)
            .await
            .is_none()
    })
    .await;

    // The key record survives a plain client.removed, so the challenge passes
    let challenge = AuthChallenge::new(pair.private_key()).unwrap();
    assert_eq!(pull(&cloud, &location_id, &challenge).await.status(), StatusCode::NOT_FOUND);
    assert!(cloud
        .context
        .subscriptions
        .subscription_for_client(&location_id)
        .await
        .is_none());
}
