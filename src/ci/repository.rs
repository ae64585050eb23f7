//! Postgres build and runner repositories using diesel_async.

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeDelta};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::ci::{
    Build, BuildStatus, BuildStore, FailureReason, RunnerAvailability, StaleCondition,
    StaleSelection, TransitionError,
};
use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::schema::{ci_builds, ci_runners};

/// Build repository holding an async connection pool.
///
/// Since `AsyncDbPool` (bb8::Pool) internally uses `Arc`, cloning is cheap.
#[derive(Clone)]
pub struct BuildRepository {
    pool: AsyncDbPool,
}

impl BuildRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }

    /// Tells a lost lock-version race apart from a row that is gone.
    async fn missed_update(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        build: &Build,
    ) -> TransitionError {
        let exists = ci_builds::table
            .find(build.id)
            .select(ci_builds::id)
            .first::<i64>(conn)
            .await
            .optional();

        match exists {
            Ok(Some(_)) => TransitionError::Conflict {
                build_id: build.id,
                expected: build.lock_version,
            },
            Ok(None) => TransitionError::NotFound(build.id),
            Err(e) => TransitionError::Store(AppError::from(e)),
        }
    }
}

#[async_trait]
impl BuildStore for BuildRepository {
    async fn find_stale(&self, selection: &StaleSelection, limit: i64) -> AppResult<Vec<Build>> {
        let mut conn = self.pool.get().await?;
        let threshold = selection.threshold;

        match selection.condition {
            StaleCondition::CreatedAndUpdatedBefore => ci_builds::table
                .filter(ci_builds::status.eq(selection.status))
                .filter(ci_builds::created_at.lt(threshold))
                .filter(ci_builds::updated_at.lt(threshold))
                .order((
                    ci_builds::created_at.asc(),
                    ci_builds::project_id.asc(),
                    ci_builds::id.asc(),
                ))
                .limit(limit)
                .select(Build::as_select())
                .load(&mut conn)
                .await
                .map_err(AppError::from),
            StaleCondition::ScheduledBefore => ci_builds::table
                .filter(ci_builds::status.eq(selection.status))
                .filter(ci_builds::scheduled_at.lt(threshold))
                .order((
                    ci_builds::created_at.asc(),
                    ci_builds::project_id.asc(),
                    ci_builds::id.asc(),
                ))
                .limit(limit)
                .select(Build::as_select())
                .load(&mut conn)
                .await
                .map_err(AppError::from),
        }
    }

    async fn reload(&self, id: i64) -> AppResult<Option<Build>> {
        let mut conn = self.pool.get().await?;

        ci_builds::table
            .find(id)
            .select(Build::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)
    }

    async fn drop_build(
        &self,
        build: &Build,
        reason: FailureReason,
        now: NaiveDateTime,
    ) -> Result<Build, TransitionError> {
        if build.is_terminal() {
            return Ok(build.clone());
        }

        let mut conn = self.pool.get().await.map_err(AppError::from)?;

        let updated = diesel::update(
            ci_builds::table
                .filter(ci_builds::id.eq(build.id))
                .filter(ci_builds::lock_version.eq(build.lock_version)),
        )
        .set((
            ci_builds::status.eq(BuildStatus::Failed),
            ci_builds::failure_reason.eq(Some(reason)),
            ci_builds::finished_at.eq(Some(now)),
            ci_builds::updated_at.eq(now),
            ci_builds::lock_version.eq(ci_builds::lock_version + 1),
        ))
        .returning(Build::as_returning())
        .get_result(&mut conn)
        .await
        .optional()
        .map_err(AppError::from)?;

        match updated {
            Some(dropped) => Ok(dropped),
            None => Err(self.missed_update(&mut conn, build).await),
        }
    }

    async fn doom(&self, build: &Build, now: NaiveDateTime) -> Result<Build, TransitionError> {
        let mut conn = self.pool.get().await.map_err(AppError::from)?;

        diesel::update(ci_builds::table.find(build.id))
            .set((
                ci_builds::status.eq(BuildStatus::Failed),
                ci_builds::failure_reason.eq(Some(FailureReason::DataIntegrityFailure)),
                ci_builds::finished_at.eq(Some(now)),
                ci_builds::updated_at.eq(now),
                ci_builds::lock_version.eq(ci_builds::lock_version + 1),
            ))
            .returning(Build::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?
            .ok_or(TransitionError::NotFound(build.id))
    }
}

/// Runner repository answering the `stuck?` question from `ci_runners`.
#[derive(Clone)]
pub struct RunnerRepository {
    pool: AsyncDbPool,
    online_timeout: TimeDelta,
}

impl RunnerRepository {
    pub fn new(pool: AsyncDbPool, online_timeout: TimeDelta) -> Self {
        Self {
            pool,
            online_timeout,
        }
    }
}

#[async_trait]
impl RunnerAvailability for RunnerRepository {
    async fn any_online_for(&self, build: &Build, now: NaiveDateTime) -> AppResult<bool> {
        let mut conn = self.pool.get().await?;
        let contacted_after = now - self.online_timeout;

        let mut query = ci_runners::table
            .select(ci_runners::id)
            .filter(ci_runners::active.eq(true))
            .filter(ci_runners::contacted_at.gt(contacted_after))
            .filter(ci_runners::tag_list.contains(build.tag_list.clone()))
            .into_boxed();

        if build.tag_list.is_empty() {
            query = query.filter(ci_runners::run_untagged.eq(true));
        }

        let found = query
            .first::<i64>(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)?;

        Ok(found.is_some())
    }
}
