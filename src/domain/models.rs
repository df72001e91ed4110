use crate::domain::error::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type GoalId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    #[default]
    Daily,
    Monthly,
    Yearly,
    Custom,
}

impl GoalType {
    pub const ALL: [GoalType; 4] = [
        GoalType::Daily,
        GoalType::Monthly,
        GoalType::Yearly,
        GoalType::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GoalType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        GoalType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(normalized))
            .ok_or_else(|| DomainError::UnknownGoalType(value.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    pub id: Option<GoalId>,
    pub name: String,
    pub target: f64,
    pub current_progress: f64,
    pub goal_type: GoalType,
    pub active: bool,
    pub begin_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl Default for Goal {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            target: 1.0,
            current_progress: 0.0,
            goal_type: GoalType::Daily,
            active: true,
            begin_date: None,
            end_date: None,
        }
    }
}

impl Goal {
    pub fn new(name: impl Into<String>, target: f64, goal_type: GoalType) -> Self {
        Self {
            name: name.into(),
            target,
            goal_type,
            ..Self::default()
        }
    }

    pub fn custom(
        name: impl Into<String>,
        target: f64,
        begin_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        Self {
            begin_date: Some(begin_date),
            end_date: Some(end_date),
            ..Self::new(name, target, GoalType::Custom)
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.target.is_finite() || self.target <= 0.0 {
            return Err(DomainError::InvalidGoal(
                "goal.target must be a positive number".to_string(),
            ));
        }
        if !self.current_progress.is_finite() {
            return Err(DomainError::InvalidGoal(
                "goal.current_progress must be a finite number".to_string(),
            ));
        }
        if self.goal_type == GoalType::Custom {
            match (self.begin_date, self.end_date) {
                (Some(begin), Some(end)) if begin <= end => {}
                (Some(_), Some(_)) => {
                    return Err(DomainError::InvalidPeriod(
                        "goal.begin_date must be <= goal.end_date".to_string(),
                    ));
                }
                _ => {
                    return Err(DomainError::InvalidPeriod(
                        "custom goals require begin_date and end_date".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Stored bounds; only custom goals keep them.
    pub fn stored_bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        match self.goal_type {
            GoalType::Custom => (self.begin_date, self.end_date),
            _ => (None, None),
        }
    }

    pub fn completion_percent(&self) -> f64 {
        if self.target <= 0.0 {
            return 0.0;
        }
        self.current_progress / self.target * 100.0
    }

    pub fn percent_label(&self) -> String {
        format!("{:.1}%", self.completion_percent())
    }

    pub fn count_label(&self) -> String {
        format!("{:.1}/{:.1}", self.current_progress, self.target)
    }
}

/// Flat persisted row of a goal. Dates are epoch seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalRecord {
    pub id: GoalId,
    pub name: String,
    pub target: f64,
    pub last_progress: f64,
    pub goal_type: String,
    pub active: bool,
    pub begin_date: Option<i64>,
    pub end_date: Option<i64>,
    pub creation_date: i64,
}

impl TryFrom<GoalRecord> for Goal {
    type Error = DomainError;

    fn try_from(record: GoalRecord) -> Result<Self, Self::Error> {
        let goal_type = record.goal_type.parse::<GoalType>()?;
        let (begin_date, end_date) = if goal_type == GoalType::Custom {
            (
                record.begin_date.map(epoch_to_utc).transpose()?,
                record.end_date.map(epoch_to_utc).transpose()?,
            )
        } else {
            (None, None)
        };

        Ok(Goal {
            id: Some(record.id),
            name: record.name,
            target: record.target,
            current_progress: record.last_progress,
            goal_type,
            active: record.active,
            begin_date,
            end_date,
        })
    }
}

pub fn epoch_to_utc(seconds: i64) -> Result<DateTime<Utc>, DomainError> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| DomainError::InvalidPeriod(format!("timestamp out of range: {seconds}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(goal_type: &str) -> GoalRecord {
        GoalRecord {
            id: 7,
            name: "Deep work".to_string(),
            target: 4.0,
            last_progress: 1.5,
            goal_type: goal_type.to_string(),
            active: true,
            begin_date: Some(1_710_450_000),
            end_date: Some(1_710_536_399),
            creation_date: 1_710_400_000,
        }
    }

    #[test]
    fn defaults_match_a_fresh_daily_goal() {
        let goal = Goal::default();
        assert_eq!(goal.target, 1.0);
        assert_eq!(goal.current_progress, 0.0);
        assert_eq!(goal.goal_type, GoalType::Daily);
        assert!(goal.active);
        assert!(goal.id.is_none());
    }

    #[test]
    fn goal_type_parses_known_tags_and_rejects_others() {
        assert_eq!("monthly".parse::<GoalType>(), Ok(GoalType::Monthly));
        assert_eq!(" Custom ".parse::<GoalType>(), Ok(GoalType::Custom));
        assert_eq!(
            "weekly".parse::<GoalType>(),
            Err(DomainError::UnknownGoalType("weekly".to_string()))
        );
    }

    #[test]
    fn record_conversion_drops_bounds_for_recurring_goals() {
        let goal = Goal::try_from(sample_record("daily")).expect("convert record");
        assert_eq!(goal.id, Some(7));
        assert_eq!(goal.goal_type, GoalType::Daily);
        assert!(goal.begin_date.is_none());
        assert!(goal.end_date.is_none());
    }

    #[test]
    fn record_conversion_keeps_bounds_for_custom_goals() {
        let goal = Goal::try_from(sample_record("custom")).expect("convert record");
        assert_eq!(goal.begin_date.map(|date| date.timestamp()), Some(1_710_450_000));
        assert_eq!(goal.end_date.map(|date| date.timestamp()), Some(1_710_536_399));
    }

    #[test]
    fn record_conversion_reports_unknown_goal_type() {
        let result = Goal::try_from(sample_record("fortnightly"));
        assert!(matches!(result, Err(DomainError::UnknownGoalType(tag)) if tag == "fortnightly"));
    }

    #[test]
    fn validate_rejects_non_positive_target() {
        let goal = Goal::new("Reading", 0.0, GoalType::Daily);
        assert!(matches!(goal.validate(), Err(DomainError::InvalidGoal(_))));
    }

    #[test]
    fn validate_rejects_custom_goal_with_reversed_bounds() {
        let begin = epoch_to_utc(1_710_536_399).expect("valid timestamp");
        let end = epoch_to_utc(1_710_450_000).expect("valid timestamp");
        let goal = Goal::custom("Sprint", 10.0, begin, end);
        assert!(matches!(goal.validate(), Err(DomainError::InvalidPeriod(_))));
    }

    #[test]
    fn labels_format_with_one_decimal() {
        let goal = Goal {
            current_progress: 75.0,
            ..Goal::new("New Goal", 100.0, GoalType::Daily)
        };
        assert_eq!(goal.percent_label(), "75.0%");
        assert_eq!(goal.count_label(), "75.0/100.0");
    }
}
