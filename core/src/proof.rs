//! # Proof-of-Control Authenticator
//!
//! Challenge/response proof that a caller holds the private key registered
//! for a DID.
//!
//! 1. [`ProofAuthenticator::generate_challenge`] stores 32 random bytes
//!    (base64) under a fresh UUID, bound to the DID, for five minutes.
//! 2. The holder signs the UTF-8 bytes of the nonce string with Ed25519.
//! 3. [`ProofAuthenticator::verify_proof`] checks that signature against
//!    the key the registry currently holds for the DID.
//!
//! A challenge is consumed only by a successful proof. A bad signature
//! leaves it in place so the holder can retry until the TTL runs out.
//!
//! The stored value is `"<did>:<nonce>"`. DIDs contain colons and base64
//! never does, so the value is split at its last colon.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::{ServiceConfig, CHALLENGE_NONCE_LENGTH, CHALLENGE_PREFIX, CHALLENGE_TTL};
use crate::crypto::verify_detached;
use crate::error::{TrustError, TrustResult};
use crate::identity::did::Did;
use crate::registry::DidRegistry;
use crate::store::{bounded, EphemeralStore};

/// An issued challenge. `nonce` is what the holder signs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub nonce_id: String,
    pub nonce: String,
    pub expires_in: Duration,
}

pub struct ProofAuthenticator {
    store: Arc<dyn EphemeralStore>,
    registry: Arc<dyn DidRegistry>,
    limits: ServiceConfig,
}

impl ProofAuthenticator {
    pub fn new(
        store: Arc<dyn EphemeralStore>,
        registry: Arc<dyn DidRegistry>,
        limits: ServiceConfig,
    ) -> Self {
        Self {
            store,
            registry,
            limits,
        }
    }

    /// Issue a single-use challenge for a registered DID.
    pub async fn generate_challenge(&self, did: &str) -> TrustResult<Challenge> {
        Did::parse(did)?;
        if self.resolve(did).await?.is_none() {
            return Err(TrustError::NotFound(did.to_string()));
        }

        let mut raw = [0u8; CHALLENGE_NONCE_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        let nonce = STANDARD.encode(raw);
        let nonce_id = Uuid::new_v4().to_string();

        bounded(
            self.limits.store_timeout,
            self.store.set_with_ttl(
                &challenge_key(&nonce_id),
                &format!("{did}:{nonce}"),
                CHALLENGE_TTL,
            ),
        )
        .await?;

        tracing::info!(did, nonce_id = %nonce_id, "challenge issued");
        Ok(Challenge {
            nonce_id,
            nonce,
            expires_in: CHALLENGE_TTL,
        })
    }

    /// Verify a base64 Ed25519 `signature` over the challenge `nonce_id`.
    ///
    /// `Err(Expired)` if the challenge is gone, `Err(InvalidChallenge)` if
    /// it belongs to another DID, `Err(NotFound)` if the DID no longer
    /// resolves. Otherwise `Ok(true)` at most once per challenge and
    /// `Ok(false)` for any undecodable key or signature or failed check.
    pub async fn verify_proof(&self, did: &str, signature: &str, nonce_id: &str) -> TrustResult<bool> {
        let key = challenge_key(nonce_id);
        let stored = bounded(self.limits.store_timeout, self.store.get(&key))
            .await?
            .ok_or(TrustError::Expired)?;

        let (bound_did, nonce) = stored
            .rsplit_once(':')
            .ok_or(TrustError::InvalidChallenge)?;
        if bound_did != did {
            tracing::warn!(did, nonce_id, "challenge presented for a different DID");
            return Err(TrustError::InvalidChallenge);
        }

        let public_key = self
            .resolve(did)
            .await?
            .ok_or_else(|| TrustError::NotFound(did.to_string()))?;

        if !verify_detached(&public_key, nonce.as_bytes(), signature) {
            tracing::info!(did, nonce_id, "proof rejected");
            return Ok(false);
        }

        let consumed = bounded(
            self.limits.store_timeout,
            self.store.compare_and_delete(&key, &stored),
        )
        .await?;
        if !consumed {
            return Err(TrustError::Expired);
        }

        tracing::info!(did, nonce_id, "proof of control verified");
        Ok(true)
    }

    async fn resolve(&self, did: &str) -> TrustResult<Option<String>> {
        tokio::time::timeout(self.limits.store_timeout, self.registry.resolve(did))
            .await
            .map_err(|_| TrustError::Timeout("did registry"))?
            .map_err(TrustError::from)
    }
}

fn challenge_key(nonce_id: &str) -> String {
    format!("{CHALLENGE_PREFIX}{nonce_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{sign_base64, IdentityKeypair};
    use crate::identity::record::{IdentityRecord, SyncStatus};
    use crate::registry::IdentityRepository;
    use crate::storage::IdentityDb;
    use crate::store::MemoryStore;

    const DID: &str = "did:key:z6MkHolder";

    fn setup() -> (ProofAuthenticator, IdentityKeypair, Arc<MemoryStore>, IdentityDb) {
        let store = Arc::new(MemoryStore::new());
        let db = IdentityDb::open_temporary().unwrap();
        let kp = IdentityKeypair::generate();
        db.save_identity(&IdentityRecord::new(DID, kp.public_key().to_base58(), SyncStatus::Synced))
            .unwrap();
        let auth = ProofAuthenticator::new(store.clone(), Arc::new(db.clone()), ServiceConfig::default());
        (auth, kp, store, db)
    }

    #[tokio::test]
    async fn test_challenge_shape() {
        let (auth, _, store, _) = setup();
        let challenge = auth.generate_challenge(DID).await.unwrap();

        assert_eq!(STANDARD.decode(&challenge.nonce).unwrap().len(), CHALLENGE_NONCE_LENGTH);
        assert!(Uuid::parse_str(&challenge.nonce_id).is_ok());
        assert_eq!(challenge.expires_in, CHALLENGE_TTL);

        let stored = store
            .get(&format!("challenge:{}", challenge.nonce_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, format!("{DID}:{}", challenge.nonce));
    }

    #[tokio::test]
    async fn test_unknown_did_not_found() {
        let (auth, _, _, _) = setup();
        assert!(matches!(
            auth.generate_challenge("did:key:z6MkNobody").await,
            Err(TrustError::NotFound(_))
        ));
        assert!(matches!(
            auth.generate_challenge("not a did").await,
            Err(TrustError::InvalidFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_valid_proof_single_use() {
        let (auth, kp, _, _) = setup();
        let challenge = auth.generate_challenge(DID).await.unwrap();
        let sig = sign_base64(&kp, challenge.nonce.as_bytes());

        assert!(auth.verify_proof(DID, &sig, &challenge.nonce_id).await.unwrap());
        assert!(matches!(
            auth.verify_proof(DID, &sig, &challenge.nonce_id).await,
            Err(TrustError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_bad_signature_retains_challenge() {
        let (auth, kp, _, _) = setup();
        let challenge = auth.generate_challenge(DID).await.unwrap();

        let impostor = IdentityKeypair::generate();
        let forged = sign_base64(&impostor, challenge.nonce.as_bytes());
        assert!(!auth.verify_proof(DID, &forged, &challenge.nonce_id).await.unwrap());
        assert!(!auth.verify_proof(DID, "garbage", &challenge.nonce_id).await.unwrap());

        let sig = sign_base64(&kp, challenge.nonce.as_bytes());
        assert!(auth.verify_proof(DID, &sig, &challenge.nonce_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_challenge_bound_to_did() {
        let (auth, kp, _, db) = setup();
        let other = "did:key:z6MkOther";
        db.save_identity(&IdentityRecord::new(other, kp.public_key().to_base58(), SyncStatus::Synced))
            .unwrap();

        let challenge = auth.generate_challenge(DID).await.unwrap();
        let sig = sign_base64(&kp, challenge.nonce.as_bytes());
        assert!(matches!(
            auth.verify_proof(other, &sig, &challenge.nonce_id).await,
            Err(TrustError::InvalidChallenge)
        ));
    }

    #[tokio::test]
    async fn test_multibase_key_accepted() {
        let (auth, _, _, db) = setup();
        let kp = IdentityKeypair::generate();
        let did = "did:key:z6MkMultibase";
        db.save_identity(&IdentityRecord::new(did, kp.public_key().to_multibase(), SyncStatus::Synced))
            .unwrap();

        let challenge = auth.generate_challenge(did).await.unwrap();
        let sig = sign_base64(&kp, challenge.nonce.as_bytes());
        assert!(auth.verify_proof(did, &sig, &challenge.nonce_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_deregistered_did_not_found() {
        let (auth, kp, _, db) = setup();
        let challenge = auth.generate_challenge(DID).await.unwrap();
        db.delete_identity(DID).unwrap();

        let sig = sign_base64(&kp, challenge.nonce.as_bytes());
        assert!(matches!(
            auth.verify_proof(DID, &sig, &challenge.nonce_id).await,
            Err(TrustError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_challenge_expires() {
        let (auth, kp, _, _) = setup();
        let challenge = auth.generate_challenge(DID).await.unwrap();
        tokio::time::advance(CHALLENGE_TTL).await;

        let sig = sign_base64(&kp, challenge.nonce.as_bytes());
        assert!(matches!(
            auth.verify_proof(DID, &sig, &challenge.nonce_id).await,
            Err(TrustError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_unknown_nonce_id_expired() {
        let (auth, _, _, _) = setup();
        assert!(matches!(
            auth.verify_proof(DID, "sig", "no-such-id").await,
            Err(TrustError::Expired)
        ));
    }
}
