//! Repository for the `resource_locks` table.

use buksu_core::locks::LockTarget;
use buksu_core::types::DbId;
use sqlx::PgPool;

use crate::models::resource_lock::{LockOwner, ResourceLock};

/// Column list for `resource_locks` queries.
const LOCK_COLUMNS: &str = "id, resource_type, resource_id, owner_id, owner_name, \
                            acquired_at, expires_at, released_at, is_active, \
                            created_at, updated_at";

/// Result of an acquire attempt against the database.
#[derive(Debug, Clone)]
pub enum AcquireResult {
    /// The caller now holds the lease (fresh insert or same-owner renewal).
    Acquired(ResourceLock),
    /// Another owner holds an unexpired lease.
    Held(ResourceLock),
    /// The holder released between our insert and our lookup.
    Raced,
}

/// Provides lease operations for exclusive resource locks.
pub struct ResourceLockRepo;

impl ResourceLockRepo {
    /// Attempt to acquire an exclusive lease on a resource.
    ///
    /// Runs in one transaction: retire an expired lease on the same target,
    /// then `INSERT ... ON CONFLICT DO NOTHING` against the partial unique
    /// index on active leases. On conflict the active row is locked and
    /// either renewed (same owner) or reported as held.
    pub async fn acquire(
        pool: &PgPool,
        target: &LockTarget,
        owner: &LockOwner,
        ttl_secs: i64,
    ) -> Result<AcquireResult, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "UPDATE resource_locks SET is_active = false, released_at = NOW() \
             WHERE resource_type = $1 AND resource_id = $2 \
               AND is_active = true AND expires_at <= NOW()",
        )
        .bind(&target.resource_type)
        .bind(&target.resource_id)
        .execute(&mut *tx)
        .await?;

        let insert = format!(
            "INSERT INTO resource_locks \
                 (resource_type, resource_id, owner_id, owner_name, expires_at) \
             VALUES ($1, $2, $3, $4, NOW() + make_interval(secs => $5)) \
             ON CONFLICT (resource_type, resource_id) WHERE is_active = true \
             DO NOTHING \
             RETURNING {LOCK_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, ResourceLock>(&insert)
            .bind(&target.resource_type)
            .bind(&target.resource_id)
            .bind(owner.id)
            .bind(&owner.name)
            .bind(ttl_secs as f64)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(lock) = inserted {
            tx.commit().await?;
            return Ok(AcquireResult::Acquired(lock));
        }

        let select = format!(
            "SELECT {LOCK_COLUMNS} FROM resource_locks \
             WHERE resource_type = $1 AND resource_id = $2 AND is_active = true \
             FOR UPDATE"
        );
        let holder = sqlx::query_as::<_, ResourceLock>(&select)
            .bind(&target.resource_type)
            .bind(&target.resource_id)
            .fetch_optional(&mut *tx)
            .await?;

        let result = match holder {
            Some(lock) if lock.owner_id == owner.id => {
                let renew = format!(
                    "UPDATE resource_locks \
                     SET expires_at = NOW() + make_interval(secs => $2), owner_name = $3 \
                     WHERE id = $1 \
                     RETURNING {LOCK_COLUMNS}"
                );
                let renewed = sqlx::query_as::<_, ResourceLock>(&renew)
                    .bind(lock.id)
                    .bind(ttl_secs as f64)
                    .bind(&owner.name)
                    .fetch_one(&mut *tx)
                    .await?;
                AcquireResult::Acquired(renewed)
            }
            Some(lock) => AcquireResult::Held(lock),
            None => AcquireResult::Raced,
        };

        tx.commit().await?;
        Ok(result)
    }

    /// Extend an active lease. Only the holder can extend.
    ///
    /// Returns the updated lease, or `None` if the caller is not the holder
    /// or the lease already lapsed.
    pub async fn extend(
        pool: &PgPool,
        target: &LockTarget,
        owner_id: DbId,
        ttl_secs: i64,
    ) -> Result<Option<ResourceLock>, sqlx::Error> {
        let query = format!(
            "UPDATE resource_locks SET expires_at = NOW() + make_interval(secs => $4) \
             WHERE resource_type = $1 AND resource_id = $2 AND owner_id = $3 \
               AND is_active = true AND expires_at > NOW() \
             RETURNING {LOCK_COLUMNS}"
        );
        sqlx::query_as::<_, ResourceLock>(&query)
            .bind(&target.resource_type)
            .bind(&target.resource_id)
            .bind(owner_id)
            .bind(ttl_secs as f64)
            .fetch_optional(pool)
            .await
    }

    /// Release a lease. Only the holder (matching `owner_id`) can release.
    ///
    /// Returns `true` if a lease was released.
    pub async fn release(
        pool: &PgPool,
        target: &LockTarget,
        owner_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE resource_locks SET is_active = false, released_at = NOW() \
             WHERE resource_type = $1 AND resource_id = $2 AND owner_id = $3 \
               AND is_active = true",
        )
        .bind(&target.resource_type)
        .bind(&target.resource_id)
        .bind(owner_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Release a lease regardless of who holds it.
    pub async fn force_release(pool: &PgPool, target: &LockTarget) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE resource_locks SET is_active = false, released_at = NOW() \
             WHERE resource_type = $1 AND resource_id = $2 AND is_active = true",
        )
        .bind(&target.resource_type)
        .bind(&target.resource_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Get the unexpired active lease for a resource, or `None` if free.
    pub async fn get_active(
        pool: &PgPool,
        target: &LockTarget,
    ) -> Result<Option<ResourceLock>, sqlx::Error> {
        let query = format!(
            "SELECT {LOCK_COLUMNS} FROM resource_locks \
             WHERE resource_type = $1 AND resource_id = $2 \
               AND is_active = true AND expires_at > NOW()"
        );
        sqlx::query_as::<_, ResourceLock>(&query)
            .bind(&target.resource_type)
            .bind(&target.resource_id)
            .fetch_optional(pool)
            .await
    }

    /// Get the unexpired active leases among `targets`.
    pub async fn get_active_many(
        pool: &PgPool,
        targets: &[LockTarget],
    ) -> Result<Vec<ResourceLock>, sqlx::Error> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let (types, ids): (Vec<String>, Vec<String>) = targets
            .iter()
            .map(|t| (t.resource_type.clone(), t.resource_id.clone()))
            .unzip();

        let query = format!(
            "SELECT {LOCK_COLUMNS} FROM resource_locks \
             WHERE is_active = true AND expires_at > NOW() \
               AND (resource_type, resource_id) IN \
                   (SELECT * FROM UNNEST($1::text[], $2::text[]))"
        );
        sqlx::query_as::<_, ResourceLock>(&query)
            .bind(types)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// List every unexpired active lease, soonest expiry first.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<ResourceLock>, sqlx::Error> {
        let query = format!(
            "SELECT {LOCK_COLUMNS} FROM resource_locks \
             WHERE is_active = true AND expires_at > NOW() \
             ORDER BY expires_at ASC"
        );
        sqlx::query_as::<_, ResourceLock>(&query).fetch_all(pool).await
    }

    /// Release all expired active leases. Returns the number released.
    pub async fn cleanup_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE resource_locks SET is_active = false, released_at = NOW() \
             WHERE is_active = true AND expires_at <= NOW()",
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
