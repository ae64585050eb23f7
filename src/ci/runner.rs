use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeDelta};
use diesel::prelude::*;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::ci::{Build, RunnerAvailability};
use crate::error::AppResult;
use crate::schema::ci_runners;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = ci_runners)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Runner {
    pub id: i64,
    pub active: bool,
    pub run_untagged: bool,
    pub tag_list: Vec<String>,
    pub contacted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl Runner {
    /// Active and contacted within `online_timeout`.
    pub fn is_online(&self, now: NaiveDateTime, online_timeout: TimeDelta) -> bool {
        self.active
            && self
                .contacted_at
                .is_some_and(|contacted_at| contacted_at > now - online_timeout)
    }

    /// Runner tags must cover every build tag; untagged builds need `run_untagged`.
    pub fn can_pick(&self, build: &Build) -> bool {
        if build.tag_list.is_empty() {
            return self.run_untagged;
        }
        build.tag_list.iter().all(|tag| self.tag_list.contains(tag))
    }
}

/// Runner availability backed by a runner list held in memory.
#[derive(Debug)]
pub struct StaticRunnerAvailability {
    runners: RwLock<Vec<Runner>>,
    online_timeout: TimeDelta,
}

impl StaticRunnerAvailability {
    pub fn new(online_timeout: TimeDelta) -> Self {
        Self {
            runners: RwLock::new(Vec::new()),
            online_timeout,
        }
    }

    pub async fn register(&self, runner: Runner) {
        let mut runners = self.runners.write().await;
        runners.retain(|r| r.id != runner.id);
        runners.push(runner);
    }

    pub async fn clear(&self) {
        self.runners.write().await.clear();
    }
}

#[async_trait]
impl RunnerAvailability for StaticRunnerAvailability {
    async fn any_online_for(&self, build: &Build, now: NaiveDateTime) -> AppResult<bool> {
        let runners = self.runners.read().await;
        Ok(runners
            .iter()
            .any(|runner| runner.is_online(now, self.online_timeout) && runner.can_pick(build)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ci::BuildStatus;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn runner(tags: &[&str], run_untagged: bool, contacted_ago: TimeDelta) -> Runner {
        Runner {
            id: 1,
            active: true,
            run_untagged,
            tag_list: tags.iter().map(|t| t.to_string()).collect(),
            contacted_at: Some(now() - contacted_ago),
            created_at: now() - TimeDelta::days(30),
        }
    }

    fn pending_build(tags: &[&str]) -> Build {
        Build {
            id: 7,
            name: "build".to_string(),
            stage_name: "build".to_string(),
            status: BuildStatus::Pending,
            failure_reason: None,
            project_id: 1,
            pipeline_id: 1,
            runner_id: None,
            tag_list: tags.iter().map(|t| t.to_string()).collect(),
            lock_version: 0,
            created_at: now() - TimeDelta::hours(3),
            updated_at: now() - TimeDelta::hours(3),
            scheduled_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn test_can_pick_requires_all_tags() {
        let r = runner(&["docker", "linux"], false, TimeDelta::minutes(1));
        assert!(r.can_pick(&pending_build(&["docker"])));
        assert!(!r.can_pick(&pending_build(&["docker", "gpu"])));
        assert!(!r.can_pick(&pending_build(&[])));
    }

    #[test]
    fn test_online_window() {
        let timeout = TimeDelta::hours(2);
        assert!(runner(&[], true, TimeDelta::minutes(119)).is_online(now(), timeout));
        assert!(!runner(&[], true, TimeDelta::minutes(121)).is_online(now(), timeout));

        let mut paused = runner(&[], true, TimeDelta::minutes(1));
        paused.active = false;
        assert!(!paused.is_online(now(), timeout));
    }

    #[tokio::test]
    async fn test_static_availability() {
        let availability = StaticRunnerAvailability::new(TimeDelta::hours(2));
        let build = pending_build(&["docker"]);
        assert!(!availability.any_online_for(&build, now()).await.unwrap());

        availability
            .register(runner(&["docker"], false, TimeDelta::minutes(5)))
            .await;
        assert!(availability.any_online_for(&build, now()).await.unwrap());

        availability.clear().await;
        assert!(!availability.any_online_for(&build, now()).await.unwrap());
    }
}
