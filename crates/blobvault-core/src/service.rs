//! Claim-aware blob service
//!
//! Layers ownership, visibility and quotas over any blob store. The claim
//! table rides a SQLite transaction around each mutation: a PUT that fails
//! its quota check writes nothing, and the refcount decision on DELETE is
//! made against the same transaction's view of the table.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use blobvault_db::{claims, BlobClaim, Database, NewClaim, User};
use blobvault_storage::{BlobInfo, BlobStore, ByteStream, Digest, Spooled};

use crate::error::CoreError;

/// Result of a PUT: the stored blob plus what happened to the claim.
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub info: BlobInfo,
    /// Whether this request created the claim (as opposed to refreshing it).
    pub created: bool,
    /// The claim's public flag after merging.
    pub is_public: bool,
}

/// The core API: PUT/GET/HEAD/DELETE/LIST over a blob store and the claim
/// table.
pub struct BlobService {
    db: Database,
    store: Arc<dyn BlobStore>,
}

impl BlobService {
    pub fn new(db: Database, store: Arc<dyn BlobStore>) -> Self {
        Self { db, store }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Ingest a blob under `user`'s claim.
    ///
    /// The body is spooled while its digest is computed; `asserted` is the
    /// digest the client promised and a mismatch rejects the upload before
    /// anything is written. The physical write sits inside the claim
    /// transaction: content-addressed writes are idempotent, so the worst a
    /// late claim failure leaves behind is an orphan blob that the next
    /// delete of that digest removes.
    pub async fn put(
        &self,
        user: &User,
        asserted: &Digest,
        body: ByteStream,
        is_public: bool,
    ) -> Result<PutOutcome, CoreError> {
        let spooled = Spooled::from_stream(body).await?;
        if spooled.digest() != asserted {
            return Err(CoreError::DigestMismatch {
                expected: asserted.to_string(),
                actual: spooled.digest().to_string(),
            });
        }
        let content_length = spooled.content_length();

        let mut tx = self.db.begin().await?;

        if let Some(quota) = user.quota {
            let already_claimed =
                claims::is_claimed_by(&mut tx, asserted.as_str(), user.id).await?;
            if !already_claimed {
                let usage = claims::usage(&mut tx, user.id).await?;
                if usage + content_length as i64 > quota {
                    return Err(CoreError::QuotaExceeded {
                        usage: usage as u64,
                        quota: quota as u64,
                        requested: content_length,
                    });
                }
            }
        }

        let info = self.store.add(&spooled).await?;

        let outcome = claims::upsert(
            &mut tx,
            &NewClaim {
                digest: info.digest.to_string(),
                user_id: user.id,
                content_length: info.content_length as i64,
                is_public,
            },
        )
        .await?;

        tx.commit().await.map_err(blobvault_db::DbError::from)?;

        debug!(
            "Stored blob {} for user {} (created: {})",
            info.digest, user.id, outcome.created
        );
        Ok(PutOutcome {
            info,
            created: outcome.created,
            is_public: outcome.is_public,
        })
    }

    /// Stream a blob visible to `user`, bumping its access counters.
    pub async fn get(
        &self,
        user: &User,
        digest: &Digest,
    ) -> Result<(BlobClaim, ByteStream), CoreError> {
        let claim = {
            let mut conn = self.db.acquire().await?;
            let claim = claims::select_visible(&mut conn, digest.as_str(), user.id)
                .await?
                .ok_or_else(|| CoreError::NotFound(digest.to_string()))?;
            claims::touch(&mut conn, digest.as_str(), user.id).await?;
            claim
        };
        let stream = self.store.open(digest).await?;
        Ok((claim, stream))
    }

    /// Claim metadata for a visible blob, without touching counters.
    pub async fn head(&self, user: &User, digest: &Digest) -> Result<BlobClaim, CoreError> {
        let mut conn = self.db.acquire().await?;
        claims::select_visible(&mut conn, digest.as_str(), user.id)
            .await?
            .ok_or_else(|| CoreError::NotFound(digest.to_string()))
    }

    /// Drop `user`'s claim; when the last claim on the digest goes, the
    /// physical blob goes with it.
    pub async fn delete(&self, user: &User, digest: &Digest) -> Result<(), CoreError> {
        let mut tx = self.db.begin().await?;

        let deleted = claims::delete(&mut tx, digest.as_str(), user.id).await?;
        if !deleted {
            return Err(CoreError::NotFound(digest.to_string()));
        }
        // Refcount check against this transaction's own snapshot.
        if !claims::any_for_digest(&mut tx, digest.as_str()).await? {
            self.store.delete(digest).await?;
            debug!("Deleted last claim and physical blob {}", digest);
        }

        tx.commit().await.map_err(blobvault_db::DbError::from)?;
        Ok(())
    }

    /// The claims `user` owns.
    pub async fn list(&self, user: &User) -> Result<Vec<BlobClaim>, CoreError> {
        let mut conn = self.db.acquire().await?;
        Ok(claims::list_for_user(&mut conn, user.id).await?)
    }

    /// Total bytes claimed by the user.
    pub async fn usage(&self, user_id: Uuid) -> Result<u64, CoreError> {
        let mut conn = self.db.acquire().await?;
        Ok(claims::usage(&mut conn, user_id).await? as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobvault_db::{DbError, NewUser};
    use blobvault_storage::{digest_bytes, InMemoryStore, StoreError};
    use bytes::Bytes;
    use futures::{stream, StreamExt};

    struct Fixture {
        backend: Arc<InMemoryStore>,
        service: BlobService,
        db: Database,
    }

    async fn fixture() -> Fixture {
        let db = Database::new_in_memory().await.unwrap();
        let backend = Arc::new(InMemoryStore::default());
        let service = BlobService::new(db.clone(), backend.clone());
        Fixture {
            backend,
            service,
            db,
        }
    }

    async fn make_user(db: &Database, name: &str, quota: Option<i64>) -> User {
        db.insert_user(NewUser {
            name: name.to_string(),
            quota,
        })
        .await
        .unwrap()
    }

    fn body(data: &'static [u8]) -> ByteStream {
        Box::pin(stream::once(async move {
            Ok::<_, StoreError>(Bytes::from_static(data))
        }))
    }

    async fn collect(mut stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn put_and_get_round_trip() {
        let f = fixture().await;
        let user = make_user(&f.db, "alice", None).await;
        let digest = digest_bytes(b"payload");

        let outcome = f
            .service
            .put(&user, &digest, body(b"payload"), false)
            .await
            .unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.info.content_length, 7);

        let (claim, stream) = f.service.get(&user, &digest).await.unwrap();
        assert_eq!(claim.content_length, 7);
        assert_eq!(collect(stream).await, b"payload");

        // The GET touched the claim.
        let claim = f.service.head(&user, &digest).await.unwrap();
        assert_eq!(claim.accesses, 1);
    }

    #[tokio::test]
    async fn digest_mismatch_leaves_no_trace() {
        let f = fixture().await;
        let user = make_user(&f.db, "alice", None).await;
        let wrong = digest_bytes(b"something else");

        let err = f
            .service
            .put(&user, &wrong, body(b"hello"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DigestMismatch { .. }));

        // No claim and no physical blob.
        assert!(f.service.list(&user).await.unwrap().is_empty());
        assert!(!f.backend.has(&digest_bytes(b"hello")).await.unwrap());
        assert!(!f.backend.has(&wrong).await.unwrap());
    }

    #[tokio::test]
    async fn refcounted_delete_across_users() {
        let f = fixture().await;
        let a = make_user(&f.db, "a", None).await;
        let b = make_user(&f.db, "b", None).await;
        let digest = digest_bytes(b"shared");

        f.service.put(&a, &digest, body(b"shared"), false).await.unwrap();
        f.service.put(&b, &digest, body(b"shared"), false).await.unwrap();

        // A's delete leaves B's claim and the blob intact.
        f.service.delete(&a, &digest).await.unwrap();
        assert!(f.backend.has(&digest).await.unwrap());
        let (_, stream) = f.service.get(&b, &digest).await.unwrap();
        assert_eq!(collect(stream).await, b"shared");

        // B's delete is the last claim: the physical blob goes too.
        f.service.delete(&b, &digest).await.unwrap();
        assert!(!f.backend.has(&digest).await.unwrap());
        assert!(matches!(
            f.service.get(&b, &digest).await,
            Err(CoreError::NotFound(_))
        ));

        // Deleting again is a 404, not a crash.
        assert!(matches!(
            f.service.delete(&b, &digest).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn quota_boundary() {
        let f = fixture().await;
        // Quota of exactly 10 bytes.
        let user = make_user(&f.db, "bounded", Some(10)).await;

        // 6 bytes, then 4 bytes: exactly at quota, accepted.
        let d1 = digest_bytes(b"sixby!");
        f.service.put(&user, &d1, body(b"sixby!"), false).await.unwrap();
        let d2 = digest_bytes(b"four");
        f.service.put(&user, &d2, body(b"four"), false).await.unwrap();
        assert_eq!(f.service.usage(user.id).await.unwrap(), 10);

        // One more byte is over.
        let d3 = digest_bytes(b"!");
        let err = f.service.put(&user, &d3, body(b"!"), false).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::QuotaExceeded {
                usage: 10,
                quota: 10,
                requested: 1
            }
        ));
        assert!(!f.backend.has(&d3).await.unwrap());

        // Re-putting an already-claimed blob is exempt from the check.
        f.service.put(&user, &d1, body(b"sixby!"), false).await.unwrap();
    }

    #[tokio::test]
    async fn public_visibility() {
        let f = fixture().await;
        let a = make_user(&f.db, "a", None).await;
        let b = make_user(&f.db, "b", None).await;
        let digest = digest_bytes(b"open data");

        f.service.put(&a, &digest, body(b"open data"), true).await.unwrap();

        // B can read the public blob...
        let (claim, stream) = f.service.get(&b, &digest).await.unwrap();
        assert!(claim.is_public);
        assert_eq!(collect(stream).await, b"open data");

        // ...but it is not in B's claim list, only A's.
        assert!(f.service.list(&b).await.unwrap().is_empty());
        let a_claims = f.service.list(&a).await.unwrap();
        assert_eq!(a_claims.len(), 1);
        assert_eq!(a_claims[0].digest, digest.to_string());

        // And B cannot delete A's claim.
        assert!(matches!(
            f.service.delete(&b, &digest).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn claim_length_conflict_surfaces() {
        let f = fixture().await;
        let user = make_user(&f.db, "alice", None).await;
        let digest = digest_bytes(b"versioned");
        f.service.put(&user, &digest, body(b"versioned"), false).await.unwrap();

        // Forge a drifted claim length to prove the upsert guards it.
        {
            let mut tx = f.db.begin().await.unwrap();
            let err = claims::upsert(
                &mut tx,
                &NewClaim {
                    digest: digest.to_string(),
                    user_id: user.id,
                    content_length: 1,
                    is_public: false,
                },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, DbError::ClaimConflict { .. }));
        }
    }

    #[tokio::test]
    async fn second_put_merges_public_flag() {
        let f = fixture().await;
        let user = make_user(&f.db, "alice", None).await;
        let digest = digest_bytes(b"soon public");

        let first = f
            .service
            .put(&user, &digest, body(b"soon public"), false)
            .await
            .unwrap();
        assert!(first.created && !first.is_public);

        let second = f
            .service
            .put(&user, &digest, body(b"soon public"), true)
            .await
            .unwrap();
        assert!(!second.created && second.is_public);

        // Public sticks even when a later put omits it.
        let third = f
            .service
            .put(&user, &digest, body(b"soon public"), false)
            .await
            .unwrap();
        assert!(third.is_public);
    }

    #[tokio::test]
    async fn every_claim_is_backed_by_a_blob() {
        let f = fixture().await;
        let user = make_user(&f.db, "alice", None).await;
        for data in [&b"one"[..], b"two", b"three"] {
            let digest = digest_bytes(data);
            f.service
                .put(&user, &digest, Box::pin(stream::once(async move {
                    Ok::<_, StoreError>(Bytes::copy_from_slice(data))
                })), false)
                .await
                .unwrap();
        }
        for claim in f.service.list(&user).await.unwrap() {
            let digest: Digest = claim.digest.parse().unwrap();
            assert!(f.backend.has(&digest).await.unwrap());
        }
    }
}
