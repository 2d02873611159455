//! Shared unit-test fixtures.

use std::sync::{Arc, OnceLock};

use bridge_crypto::KeyPair;

use crate::keystore::{KeyRecord, KeyStore, MemoryKeyStore};

pub(crate) const CLOUD_ID: &str = "cloud";
pub(crate) const CLIENT_ID: &str = "loc-7";

pub(crate) fn cloud_keys() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| KeyPair::generate(1024).unwrap())
}

pub(crate) fn client_keys() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| KeyPair::generate(1024).unwrap())
}

/// A store holding both full keypairs, usable as either side.
pub(crate) async fn seeded_store() -> Arc<dyn KeyStore> {
    let store = MemoryKeyStore::new();
    store
        .put(CLOUD_ID, &KeyRecord::from_keypair(cloud_keys()).unwrap())
        .await
        .unwrap();
    store
        .put(CLIENT_ID, &KeyRecord::from_keypair(client_keys()).unwrap())
        .await
        .unwrap();
    Arc::new(store)
}
