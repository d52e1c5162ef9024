//! Known event kinds
//!
//! The ledger accepts any mapping under any event type; these are the kinds
//! the activity service writes. Serialized, each variant is a flat mapping
//! tagged with `event_type`, so a stored [`EventRecord`] decodes back into
//! the variant it was appended from.

use crate::{types::EventRecord, Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Ledger events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A user posted an activity
    ActivitySubmission {
        /// Submitting user, when known separately from the activity
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        /// The activity itself
        activity: Activity,
    },

    /// An activity was scored
    ActivityScored {
        /// Height of the `activity_submission` block
        activity_height: u64,
        /// Computed difficulty
        difficulty_score: f64,
        /// Points awarded on completion
        points: u64,
        /// Free-form risk label
        risk_level: String,
    },

    /// A user completed an activity
    ActivityCompleted {
        /// Completing user
        user_id: String,
        /// Height of the `activity_submission` block
        activity_height: u64,
    },

    /// A campaign was generated
    CampaignGenerated {
        /// Campaign document
        campaign: Map<String, Value>,
    },
}

impl LedgerEvent {
    /// Event type tag written to the block
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::ActivitySubmission { .. } => "activity_submission",
            LedgerEvent::ActivityScored { .. } => "activity_scored",
            LedgerEvent::ActivityCompleted { .. } => "activity_completed",
            LedgerEvent::CampaignGenerated { .. } => "campaign_generated",
        }
    }

    /// Decode a stored payload
    ///
    /// The `version` stamp is ignored.
    pub fn from_record(record: &EventRecord) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(
            record.fields().clone(),
        ))?)
    }
}

/// An outdoor activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Activity identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Longer description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Posting user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_who_posted: Option<String>,

    /// Seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_posted: Option<i64>,

    /// Difficulty as rated by the poster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_rating: Option<f64>,

    /// Points awarded on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u64>,

    /// Any further fields (location, tags, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Activity {
    /// Minimal activity with only an id and name
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            user_who_posted: None,
            time_posted: None,
            difficulty_rating: None,
            points: None,
            extra: Map::new(),
        }
    }
}

/// Activity as posted by a client, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySubmission {
    /// Display name
    pub name: String,

    /// Longer description
    pub description: String,

    /// Posting user
    pub user_who_posted: String,

    /// Difficulty as rated by the poster
    pub difficulty_rating: f64,

    /// Points awarded on completion
    pub points: i64,

    /// Seconds since the Unix epoch; defaults to now
    #[serde(default)]
    pub time_posted: Option<i64>,
}

impl ActivitySubmission {
    /// Validate and assign a fresh id
    pub fn into_activity(self) -> Result<Activity> {
        let name = required("name", &self.name)?;
        let description = required("description", &self.description)?;
        let user_who_posted = required("user_who_posted", &self.user_who_posted)?;

        let points = u64::try_from(self.points).map_err(|_| {
            Error::InvalidEvent("points must be a non-negative integer".to_string())
        })?;
        if !self.difficulty_rating.is_finite() {
            return Err(Error::InvalidEvent(
                "difficulty_rating must be a finite number".to_string(),
            ));
        }

        Ok(Activity {
            id: Uuid::new_v4().to_string(),
            name,
            description: Some(description),
            user_who_posted: Some(user_who_posted),
            time_posted: Some(self.time_posted.unwrap_or_else(|| Utc::now().timestamp())),
            difficulty_rating: Some(self.difficulty_rating),
            points: Some(points),
            extra: Map::new(),
        })
    }
}

/// Demo activities written by `chain-ledger seed`
const SAMPLE_ACTIVITIES: &[(&str, &str, &str, f64, i64)] = &[
    ("Old Rag Mountain Trail", "9 mile rocky steep hike with panoramic summit views.", "alex", 8.7, 250),
    ("Shenandoah River Kayaking", "Calm river paddle with light rapids.", "maria", 5.5, 140),
    ("Great Falls Cliff Overlook", "Scenic cliffside walk overlooking waterfalls.", "david", 6.2, 180),
    ("Downtown Artisan Cafe", "Cozy cafe with live music and specialty espresso drinks.", "sophia", 2.0, 30),
    ("Capitol Hill Food Crawl", "Visit 4 restaurants in one evening.", "ryan", 3.8, 90),
    ("Rock Creek Park Trail Run", "5 mile forest trail run with rolling hills.", "emma", 4.5, 110),
    ("Sunset Beach Walk", "Relaxing 2 mile sunset walk along the shoreline.", "liam", 1.5, 20),
    ("Indoor Rock Climbing Gym", "Advanced climbing routes up to V7 difficulty.", "noah", 7.3, 200),
    ("Historic Monument Tour", "Guided walking tour of 5 historic landmarks.", "ava", 2.8, 60),
    ("Whitewater Rafting Adventure", "Class III-IV rapids for adrenaline seekers.", "ethan", 9.1, 300),
];

/// Submissions for the demo activities, posted now
pub fn sample_activities() -> Vec<ActivitySubmission> {
    SAMPLE_ACTIVITIES
        .iter()
        .map(
            |&(name, description, user, difficulty_rating, points)| ActivitySubmission {
                name: name.to_string(),
                description: description.to_string(),
                user_who_posted: user.to_string(),
                difficulty_rating,
                points,
                time_posted: None,
            },
        )
        .collect()
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidEvent(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission() -> ActivitySubmission {
        ActivitySubmission {
            name: "  Ridge Hike ".to_string(),
            description: "Loop over the north ridge".to_string(),
            user_who_posted: "u1".to_string(),
            difficulty_rating: 6.5,
            points: 120,
            time_posted: Some(1_700_000_000),
        }
    }

    #[test]
    fn test_sample_activities_are_valid() {
        let samples = sample_activities();
        assert_eq!(samples.len(), 10);
        for sample in samples {
            let activity = sample.into_activity().unwrap();
            assert!(activity.time_posted.is_some());
            assert!(activity.points.unwrap() > 0);
        }
    }

    #[test]
    fn test_event_type_tags() {
        let scored = LedgerEvent::ActivityScored {
            activity_height: 1,
            difficulty_score: 8.7,
            points: 250,
            risk_level: "moderate".to_string(),
        };
        assert_eq!(scored.event_type(), "activity_scored");

        let value = serde_json::to_value(&scored).unwrap();
        assert_eq!(value["event_type"], "activity_scored");
        assert_eq!(value["activity_height"], 1);
    }

    #[test]
    fn test_from_record_ignores_version() {
        let record: EventRecord = serde_json::from_value(json!({
            "event_type": "activity_completed",
            "version": 1,
            "user_id": "u2",
            "activity_height": 4,
        }))
        .unwrap();

        assert_eq!(
            LedgerEvent::from_record(&record).unwrap(),
            LedgerEvent::ActivityCompleted {
                user_id: "u2".to_string(),
                activity_height: 4,
            }
        );
    }

    #[test]
    fn test_from_record_unknown_type() {
        let record: EventRecord =
            serde_json::from_value(json!({"event_type": "genesis", "version": 1})).unwrap();
        assert!(LedgerEvent::from_record(&record).is_err());
    }

    #[test]
    fn test_activity_extra_fields_kept() {
        let activity: Activity = serde_json::from_value(json!({
            "id": "a1",
            "name": "Hike",
            "location": "Cairngorms",
        }))
        .unwrap();
        assert_eq!(activity.extra.get("location"), Some(&json!("Cairngorms")));
        assert_eq!(
            serde_json::to_value(&activity).unwrap(),
            json!({"id": "a1", "name": "Hike", "location": "Cairngorms"})
        );
    }

    #[test]
    fn test_submission_validation() {
        let activity = submission().into_activity().unwrap();
        assert_eq!(activity.name, "Ridge Hike");
        assert_eq!(activity.points, Some(120));
        assert_eq!(activity.time_posted, Some(1_700_000_000));
        assert!(Uuid::parse_str(&activity.id).is_ok());
    }

    #[test]
    fn test_submission_defaults_time_posted() {
        let mut s = submission();
        s.time_posted = None;
        let activity = s.into_activity().unwrap();
        assert!(activity.time_posted.unwrap() > 1_700_000_000);
    }

    #[test]
    fn test_submission_rejects_blank_fields() {
        let mut s = submission();
        s.name = "   ".to_string();
        assert!(matches!(s.into_activity(), Err(Error::InvalidEvent(_))));

        let mut s = submission();
        s.user_who_posted = String::new();
        assert!(matches!(s.into_activity(), Err(Error::InvalidEvent(_))));
    }

    #[test]
    fn test_submission_rejects_negative_points() {
        let mut s = submission();
        s.points = -5;
        assert!(matches!(s.into_activity(), Err(Error::InvalidEvent(_))));
    }

    #[test]
    fn test_submission_rejects_nan_rating() {
        let mut s = submission();
        s.difficulty_rating = f64::NAN;
        assert!(matches!(s.into_activity(), Err(Error::InvalidEvent(_))));
    }
}
