use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::domain::{
    attempt::AttemptSummary,
    exam::{ExamSpec, ExamType},
    progress::{ProgressRecord, ProgressScope},
};

/// Why a start was refused. Serialised into the error payload so clients
/// can render an actionable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum GateRejection {
    UpgradeRequired {
        level: u32,
        threshold: u32,
    },
    LevelLocked {
        required_level: u32,
    },
    CooldownActive {
        next_eligible_at: DateTime<Utc>,
        failed_attempts: usize,
    },
}

impl GateRejection {
    pub fn code(&self) -> &'static str {
        match self {
            GateRejection::UpgradeRequired { .. } => "UPGRADE_REQUIRED",
            GateRejection::LevelLocked { .. } => "LEVEL_LOCKED",
            GateRejection::CooldownActive { .. } => "COOLDOWN_ACTIVE",
        }
    }
}

impl std::fmt::Display for GateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateRejection::UpgradeRequired { level, threshold } => write!(
                f,
                "level {} requires a premium subscription (free access ends at level {})",
                level, threshold
            ),
            GateRejection::LevelLocked { required_level } => {
                write!(f, "pass level {} to unlock this exam", required_level)
            }
            GateRejection::CooldownActive {
                next_eligible_at, ..
            } => write!(f, "retry available at {}", next_eligible_at.to_rfc3339()),
        }
    }
}

/// Cooldown ladders per exam type, indexed by number of failed attempts.
/// The last rung repeats.
#[derive(Debug, Clone, PartialEq)]
pub struct CooldownPolicy {
    pub category: Vec<Duration>,
    pub level: Vec<Duration>,
    pub boss: Vec<Duration>,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            category: vec![
                Duration::minutes(10),
                Duration::minutes(30),
                Duration::minutes(60),
            ],
            level: vec![Duration::minutes(30), Duration::minutes(120)],
            boss: vec![
                Duration::minutes(30),
                Duration::hours(12),
                Duration::hours(24),
            ],
        }
    }
}

impl CooldownPolicy {
    fn ladder(&self, exam_type: ExamType) -> &[Duration] {
        match exam_type {
            ExamType::Category => &self.category,
            ExamType::Level => &self.level,
            ExamType::Boss => &self.boss,
        }
    }

    pub fn cooldown_for(&self, exam_type: ExamType, failed_attempts: usize) -> Duration {
        if failed_attempts == 0 {
            return Duration::zero();
        }
        let ladder = self.ladder(exam_type);
        ladder
            .get(failed_attempts - 1)
            .or_else(|| ladder.last())
            .copied()
            .unwrap_or_else(Duration::zero)
    }
}

/// Start/access rules. Every check is a pure function of the history passed
/// in, including the clock.
#[derive(Debug, Clone)]
pub struct ProgressionGate {
    cooldowns: CooldownPolicy,
    premium_level_threshold: u32,
}

impl ProgressionGate {
    pub fn new(cooldowns: CooldownPolicy, premium_level_threshold: u32) -> Self {
        Self {
            cooldowns,
            premium_level_threshold,
        }
    }

    /// `None` when a new attempt may start at `now`, else the instant the
    /// cooldown after the most recent failure ends.
    pub fn can_start(
        &self,
        exam_type: ExamType,
        history: &[AttemptSummary],
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let latest_submitted = history
            .iter()
            .filter(|a| a.submitted_at.is_some())
            .max_by_key(|a| a.submitted_at)?;
        if latest_submitted.pass == Some(true) {
            return None;
        }

        let failures: Vec<DateTime<Utc>> = history
            .iter()
            .filter(|a| a.pass == Some(false))
            .filter_map(|a| a.submitted_at)
            .collect();
        let last_failure = failures.iter().max()?;

        let eligible_at = *last_failure + self.cooldowns.cooldown_for(exam_type, failures.len());
        if now < eligible_at {
            Some(eligible_at)
        } else {
            None
        }
    }

    pub fn check_cooldown(
        &self,
        exam_type: ExamType,
        history: &[AttemptSummary],
        now: DateTime<Utc>,
    ) -> Result<(), GateRejection> {
        match self.can_start(exam_type, history, now) {
            Some(next_eligible_at) => Err(GateRejection::CooldownActive {
                next_eligible_at,
                failed_attempts: history.iter().filter(|a| a.pass == Some(false)).count(),
            }),
            None => Ok(()),
        }
    }

    pub fn can_access_level(
        &self,
        level: u32,
        is_premium: bool,
        progress: &[ProgressRecord],
    ) -> Result<(), GateRejection> {
        if level > self.premium_level_threshold && !is_premium {
            return Err(GateRejection::UpgradeRequired {
                level,
                threshold: self.premium_level_threshold,
            });
        }

        if level > 1 {
            let required_level = level - 1;
            let required = ProgressScope::Level(required_level);
            let passed = progress
                .iter()
                .any(|p| p.scope == required && p.is_passed());
            if !passed {
                return Err(GateRejection::LevelLocked { required_level });
            }
        }

        Ok(())
    }

    /// Premium and progression rules for an exam. Category exams are always
    /// reachable.
    pub fn check_access(
        &self,
        exam: &ExamSpec,
        is_premium: bool,
        progress: &[ProgressRecord],
    ) -> Result<(), GateRejection> {
        match (exam.exam_type, exam.level_number) {
            (ExamType::Level | ExamType::Boss, Some(level)) => {
                self.can_access_level(level, is_premium, progress)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::{boss_exam, category_exam, level_exam};

    fn gate() -> ProgressionGate {
        ProgressionGate::new(CooldownPolicy::default(), 10)
    }

    fn failed_at(number: u32, at: DateTime<Utc>) -> AttemptSummary {
        AttemptSummary {
            attempt_number: number,
            submitted_at: Some(at),
            pass: Some(false),
        }
    }

    fn passed_record(level: u32) -> ProgressRecord {
        let mut record = ProgressRecord::new("user-1", ProgressScope::Level(level));
        record.apply_evaluation(80.0, true, Utc::now());
        record
    }

    #[test]
    fn cooldown_blocks_until_window_elapses() {
        let t0 = Utc::now();
        let history = vec![failed_at(1, t0)];
        let window = CooldownPolicy::default().cooldown_for(ExamType::Level, 1);

        let blocked = gate().can_start(ExamType::Level, &history, t0 + Duration::seconds(1));
        assert_eq!(blocked, Some(t0 + window));

        let allowed = gate().can_start(
            ExamType::Level,
            &history,
            t0 + window + Duration::seconds(1),
        );
        assert_eq!(allowed, None);
    }

    #[test]
    fn cooldown_escalates_with_repeated_failures() {
        let t0 = Utc::now();
        let policy = CooldownPolicy::default();
        let history = vec![
            failed_at(1, t0 - Duration::days(3)),
            failed_at(2, t0 - Duration::days(2)),
            failed_at(3, t0),
        ];

        let next = gate()
            .can_start(ExamType::Boss, &history, t0 + Duration::hours(1))
            .expect("third boss failure should still be cooling down");

        assert_eq!(next, t0 + Duration::hours(24));
        assert_eq!(policy.cooldown_for(ExamType::Level, 5), Duration::minutes(120));
        assert_eq!(policy.cooldown_for(ExamType::Category, 0), Duration::zero());
    }

    #[test]
    fn passing_attempt_does_not_trigger_cooldown() {
        let t0 = Utc::now();
        let history = vec![AttemptSummary {
            attempt_number: 1,
            submitted_at: Some(t0),
            pass: Some(true),
        }];

        assert_eq!(gate().can_start(ExamType::Level, &history, t0), None);
    }

    #[test]
    fn in_progress_attempts_do_not_count_as_failures() {
        let t0 = Utc::now();
        let history = vec![AttemptSummary {
            attempt_number: 1,
            submitted_at: None,
            pass: None,
        }];

        assert!(gate().check_cooldown(ExamType::Category, &history, t0).is_ok());
    }

    #[test]
    fn cooldown_rejection_carries_next_eligible_time() {
        let t0 = Utc::now();
        let history = vec![failed_at(1, t0)];

        let err = gate()
            .check_cooldown(ExamType::Category, &history, t0)
            .expect_err("should be cooling down");

        assert_eq!(
            err,
            GateRejection::CooldownActive {
                next_eligible_at: t0 + Duration::minutes(10),
                failed_attempts: 1,
            }
        );
    }

    #[test]
    fn level_two_requires_level_one_pass() {
        let err = gate()
            .can_access_level(2, false, &[])
            .expect_err("level 2 should be locked");
        assert_eq!(err, GateRejection::LevelLocked { required_level: 1 });

        assert!(gate().can_access_level(2, false, &[passed_record(1)]).is_ok());
    }

    #[test]
    fn failed_prior_level_stays_locked() {
        let mut record = ProgressRecord::new("user-1", ProgressScope::Level(4));
        record.apply_evaluation(40.0, false, Utc::now());

        assert_eq!(
            gate().can_access_level(5, true, &[record]),
            Err(GateRejection::LevelLocked { required_level: 4 })
        );
    }

    #[test]
    fn levels_above_threshold_need_premium() {
        let progress = vec![passed_record(10)];

        assert_eq!(
            gate().can_access_level(11, false, &progress),
            Err(GateRejection::UpgradeRequired {
                level: 11,
                threshold: 10,
            })
        );
        assert!(gate().can_access_level(11, true, &progress).is_ok());
    }

    #[test]
    fn level_one_and_category_exams_are_always_reachable() {
        assert!(gate().can_access_level(1, false, &[]).is_ok());
        assert!(gate()
            .check_access(&category_exam("cat-exam", "cat-1"), false, &[])
            .is_ok());
        assert!(gate().check_access(&level_exam("l1", 1), false, &[]).is_ok());
    }

    #[test]
    fn boss_exam_follows_level_rules() {
        let exam = boss_exam("boss-10", 10);

        assert_eq!(
            gate().check_access(&exam, false, &[]),
            Err(GateRejection::LevelLocked { required_level: 9 })
        );
        assert!(gate().check_access(&exam, false, &[passed_record(9)]).is_ok());
    }
}
