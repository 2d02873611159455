//! First-start identity bootstrap for the agent.
//!
//! The agent ends up with its own keypair stored under its location ID and
//! the cloud's public key stored under the configured cloud ID.

use anyhow::{Context, Result};
use bridge_crypto::KeyPair;
use bridge_types::RegistrationRequest;

use super::RelayContext;
use crate::keystore::KeyRecord;

/// Resolve the agent's location ID, registering with the cloud if needed.
///
/// Order:
/// 1. `BRIDGE_LOCATION_ID`, which must already hold a private key
/// 2. the single stored identity with a private key
/// 3. a fresh registration
pub async fn ensure_registered(ctx: &RelayContext) -> Result<String> {
    let cloud_id = ctx.config.cloud_id.as_str();

    let location_id = match &ctx.config.relay.location_id {
        Some(id) => {
            let record = ctx
                .key_store
                .get(id)
                .await?
                .with_context(|| format!("configured location {:?} is not in the key store", id))?;
            if record.private_key.is_none() {
                anyhow::bail!("key store entry {:?} has no private key", id);
            }
            id.clone()
        }
        None => match stored_identity(ctx, cloud_id).await? {
            Some(id) => id,
            None => register(ctx).await?,
        },
    };

    if ctx.key_store.get(cloud_id).await?.is_none() {
        anyhow::bail!("cloud public key {:?} missing from the key store", cloud_id);
    }

    tracing::info!(location_id = %location_id, "Using client identity");
    Ok(location_id)
}

async fn stored_identity(ctx: &RelayContext, cloud_id: &str) -> Result<Option<String>> {
    let mut own = Vec::new();
    for id in ctx.key_store.list_ids().await? {
        if id == cloud_id {
            continue;
        }
        if let Some(record) = ctx.key_store.get(&id).await? {
            if record.private_key.is_some() {
                own.push(id);
            }
        }
    }
    match own.len() {
        0 => Ok(None),
        1 => Ok(own.pop()),
        _ => anyhow::bail!(
            "key store holds several client identities ({}), set BRIDGE_LOCATION_ID",
            own.join(", ")
        ),
    }
}

async fn register(ctx: &RelayContext) -> Result<String> {
    let registration = &ctx.config.registration;
    if registration.prem_id.is_empty() || registration.user_id.is_empty() {
        anyhow::bail!("no stored identity; BRIDGE_PREM_ID and BRIDGE_USER_ID are required to register");
    }

    let key_bits = ctx.config.security.key_bits;
    let pair = tokio::task::spawn_blocking(move || KeyPair::generate(key_bits))
        .await
        .context("key generation task failed")??;

    tracing::info!(prem_id = %registration.prem_id, "Registering with cloud");
    let response = ctx
        .api
        .register(
            &RegistrationRequest {
                prem_id: registration.prem_id.clone(),
                user_id: registration.user_id.clone(),
                secret: registration.secret.clone(),
                public_key: pair.public_key_pem()?,
            },
            registration.timeout,
        )
        .await
        .context("registration failed")?;

    let cloud = KeyRecord::from_public_pem(&response.cloud_public_key)
        .context("cloud returned an invalid public key")?;
    let own = KeyRecord::from_keypair(&pair)?
        .with_metadata("premID", registration.prem_id.as_str())
        .with_metadata("userID", registration.user_id.as_str());

    ctx.key_store.put(&ctx.config.cloud_id, &cloud).await?;
    ctx.key_store.put(&response.location_id, &own).await?;

    tracing::info!(location_id = %response.location_id, "Registered with cloud");
    Ok(response.location_id)
}
