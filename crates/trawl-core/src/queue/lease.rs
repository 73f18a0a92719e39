//! Lease state machine.
//!
//! Pure functions over an [`ExtractionTask`]. Store backends call these while
//! holding their own lock / transaction so the checks and the mutation happen
//! together.
//!
//! Design:
//! - acquirable: AVAILABLE, or ACQUIRED with `visible_at < now`
//! - current:    ACQUIRED with `visible_at > now`
//! - `visible_at == now` はどちらでもない（境界は取得も解決も不可）
//! - resolve には acquire で受け取った [`LeaseToken`] が要る。期限切れ後に
//!   他のワーカーが取り直すと `visible_at` が進むので、古い token は一致しない

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::TaskStatus;
use crate::domain::ExtractionTask;
use crate::error::TrawlError;

/// Default lease length (15 minutes).
pub const DEFAULT_LEASE_DURATION: TimeDelta = TimeDelta::minutes(15);

/// Proof of one particular acquisition: the `visible_at` handed out by `acquire`.
///
/// 再取得は必ず `visible_at` を前に進める（`old < now < now + lease`）ので、
/// 同じ task で token が重なることはない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseToken(DateTime<Utc>);

impl LeaseToken {
    pub fn new(visible_at: DateTime<Utc>) -> Self {
        Self(visible_at)
    }

    /// Token of an ACQUIRED task. `None` when the task holds no lease.
    pub fn of(task: &ExtractionTask) -> Option<Self> {
        match task.status {
            TaskStatus::Acquired => task.visible_at.map(Self),
            _ => None,
        }
    }

    pub fn expires_at(self) -> DateTime<Utc> {
        self.0
    }
}

/// How an acquired task ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Completed,
    Failed(String),
}

pub fn is_acquirable(task: &ExtractionTask, now: DateTime<Utc>) -> bool {
    match task.status {
        TaskStatus::Available => true,
        TaskStatus::Acquired => task.visible_at.is_some_and(|v| v < now),
        TaskStatus::Completed | TaskStatus::Failed => false,
    }
}

pub fn is_acquired_and_current(task: &ExtractionTask, now: DateTime<Utc>) -> bool {
    task.status == TaskStatus::Acquired && task.visible_at.is_some_and(|v| v > now)
}

/// Take a lease on `task`, valid until `now + lease`.
pub fn acquire(task: &mut ExtractionTask, now: DateTime<Utc>, lease: TimeDelta) -> Result<(), TrawlError> {
    if !is_acquirable(task, now) {
        return Err(match (task.status, task.visible_at) {
            (TaskStatus::Acquired, Some(visible_at)) => TrawlError::LeaseHeld {
                id: task.id,
                visible_at,
            },
            (status, _) if status.is_terminal() => TrawlError::TaskAlreadyTerminal {
                id: task.id,
                status,
            },
            (status, visible_at) => TrawlError::LeaseNotCurrent {
                id: task.id,
                status,
                visible_at,
            },
        });
    }
    task.status = TaskStatus::Acquired;
    task.visible_at = Some(now + lease);
    Ok(())
}

/// Reject resolving a task that is terminal, whose lease is not current, or
/// whose current lease is not the one `token` was issued for.
pub fn ensure_resolvable(
    task: &ExtractionTask,
    token: LeaseToken,
    now: DateTime<Utc>,
) -> Result<(), TrawlError> {
    if task.status.is_terminal() {
        return Err(TrawlError::TaskAlreadyTerminal {
            id: task.id,
            status: task.status,
        });
    }
    if !is_acquired_and_current(task, now) || LeaseToken::of(task) != Some(token) {
        return Err(TrawlError::LeaseNotCurrent {
            id: task.id,
            status: task.status,
            visible_at: task.visible_at,
        });
    }
    Ok(())
}

/// Move an acquired-and-current task to its terminal status.
pub fn resolve(
    task: &mut ExtractionTask,
    token: LeaseToken,
    resolution: Resolution,
    now: DateTime<Utc>,
) -> Result<(), TrawlError> {
    ensure_resolvable(task, token, now)?;
    task.visible_at = None;
    match resolution {
        Resolution::Completed => {
            task.status = TaskStatus::Completed;
            task.error = None;
        }
        Resolution::Failed(message) => {
            task.status = TaskStatus::Failed;
            task.error = Some(message);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountTaskConfig, Network, TaskConfig, TaskId};
    use chrono::TimeZone;
    use rstest::rstest;
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn task(status: TaskStatus, visible_offset_secs: Option<i64>) -> ExtractionTask {
        let mut t = ExtractionTask::new(
            TaskId::from(Ulid::new()),
            Network::Youtube,
            TaskConfig::Account(AccountTaskConfig {
                account_id: "alice".into(),
            }),
            now() - TimeDelta::hours(1),
        );
        t.status = status;
        t.visible_at = visible_offset_secs.map(|s| now() + TimeDelta::seconds(s));
        t
    }

    #[rstest]
    #[case::available(TaskStatus::Available, None, true, false)]
    #[case::held(TaskStatus::Acquired, Some(60), false, true)]
    #[case::expired(TaskStatus::Acquired, Some(-60), true, false)]
    #[case::exact_boundary(TaskStatus::Acquired, Some(0), false, false)]
    #[case::completed(TaskStatus::Completed, None, false, false)]
    #[case::failed(TaskStatus::Failed, None, false, false)]
    fn predicates(
        #[case] status: TaskStatus,
        #[case] offset: Option<i64>,
        #[case] acquirable: bool,
        #[case] current: bool,
    ) {
        let t = task(status, offset);
        assert_eq!(is_acquirable(&t, now()), acquirable);
        assert_eq!(is_acquired_and_current(&t, now()), current);
    }

    #[test]
    fn acquire_sets_lease_expiry() {
        let mut t = task(TaskStatus::Available, None);
        acquire(&mut t, now(), DEFAULT_LEASE_DURATION).unwrap();

        assert_eq!(t.status, TaskStatus::Acquired);
        assert_eq!(t.visible_at, Some(now() + TimeDelta::minutes(15)));
    }

    #[test]
    fn acquire_rejects_held_lease() {
        let mut t = task(TaskStatus::Acquired, Some(30));
        let err = acquire(&mut t, now(), DEFAULT_LEASE_DURATION).unwrap_err();
        assert!(matches!(err, TrawlError::LeaseHeld { .. }));
    }

    #[test]
    fn expired_lease_can_be_reacquired() {
        let mut t = task(TaskStatus::Acquired, Some(-1));
        acquire(&mut t, now(), DEFAULT_LEASE_DURATION).unwrap();
        assert_eq!(t.visible_at, Some(now() + DEFAULT_LEASE_DURATION));
    }

    #[test]
    fn complete_clears_lease() {
        let mut t = task(TaskStatus::Acquired, Some(60));
        let token = LeaseToken::of(&t).unwrap();
        resolve(&mut t, token, Resolution::Completed, now()).unwrap();

        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(t.visible_at, None);
        assert_eq!(t.error, None);
    }

    #[test]
    fn fail_records_message() {
        let mut t = task(TaskStatus::Acquired, Some(60));
        let token = LeaseToken::of(&t).unwrap();
        resolve(&mut t, token, Resolution::Failed("boom".into()), now()).unwrap();

        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.visible_at, None);
        assert_eq!(t.error.as_deref(), Some("boom"));
    }

    #[rstest]
    #[case::completed(TaskStatus::Completed)]
    #[case::failed(TaskStatus::Failed)]
    fn terminal_tasks_cannot_be_resolved_again(#[case] status: TaskStatus) {
        let mut t = task(status, None);
        let before = t.clone();

        let token = LeaseToken::new(now() + TimeDelta::minutes(1));
        let err = resolve(&mut t, token, Resolution::Failed("late".into()), now()).unwrap_err();
        assert!(matches!(err, TrawlError::TaskAlreadyTerminal { .. }));
        assert_eq!(t, before);
    }

    #[rstest]
    #[case::never_acquired(TaskStatus::Available, None)]
    #[case::expired(TaskStatus::Acquired, Some(-1))]
    #[case::boundary(TaskStatus::Acquired, Some(0))]
    fn stale_leases_cannot_be_resolved(#[case] status: TaskStatus, #[case] offset: Option<i64>) {
        let mut t = task(status, offset);
        let before = t.clone();

        let token = LeaseToken::new(t.visible_at.unwrap_or(now()));
        let err = resolve(&mut t, token, Resolution::Completed, now()).unwrap_err();
        assert!(matches!(err, TrawlError::LeaseNotCurrent { .. }));
        assert_eq!(t, before);
    }

    #[test]
    fn token_of_a_reclaimed_lease_is_rejected() {
        let mut t = task(TaskStatus::Available, None);
        acquire(&mut t, now(), DEFAULT_LEASE_DURATION).unwrap();
        let first = LeaseToken::of(&t).unwrap();

        let later = now() + TimeDelta::minutes(16);
        acquire(&mut t, later, DEFAULT_LEASE_DURATION).unwrap();
        let second = LeaseToken::of(&t).unwrap();
        assert_ne!(first, second);

        let err = resolve(&mut t, first, Resolution::Completed, later).unwrap_err();
        assert!(matches!(err, TrawlError::LeaseNotCurrent { .. }));
        assert_eq!(t.status, TaskStatus::Acquired);

        resolve(&mut t, second, Resolution::Completed, later).unwrap();
        assert_eq!(t.status, TaskStatus::Completed);
    }

    #[rstest]
    #[case::available(TaskStatus::Available, None)]
    #[case::completed(TaskStatus::Completed, None)]
    fn only_acquired_tasks_have_a_token(#[case] status: TaskStatus, #[case] offset: Option<i64>) {
        assert_eq!(LeaseToken::of(&task(status, offset)), None);
    }
}
