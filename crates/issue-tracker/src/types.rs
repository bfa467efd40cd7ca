use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Rejection;
use crate::id::IssueId;
use crate::payload::{lenient_bool, lenient_string};
use crate::store::{Document, Fields};

/// Fields a client may filter a listing on, in addition to `_id`. Updates
/// accept a subset: the timestamps are never client-set.
pub const ISSUE_FIELDS: &[&str] = &[
    "issue_title",
    "issue_text",
    "created_by",
    "assigned_to",
    "status_text",
    "open",
    "created_on",
    "updated_on",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "_id")]
    pub id: IssueId,
    pub issue_title: String,
    pub issue_text: String,
    pub created_by: String,
    #[serde(default)]
    pub assigned_to: String,
    #[serde(default)]
    pub status_text: String,
    pub open: bool,
    #[serde(with = "iso_millis")]
    pub created_on: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub updated_on: DateTime<Utc>,
}

impl TryFrom<Document> for Issue {
    type Error = serde_json::Error;

    fn try_from(doc: Document) -> Result<Self, Self::Error> {
        serde_json::from_value(doc.into_value())
    }
}

/// Current time truncated to the millisecond, the resolution timestamps are
/// stored at.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// ISO 8601 with milliseconds and a `Z` suffix: `2024-05-01T12:00:00.000Z`.
pub(crate) mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// --- Request schemas ---

#[derive(Debug, Default, Deserialize)]
pub struct CreateIssueBody {
    #[serde(default, deserialize_with = "lenient_string")]
    pub issue_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub issue_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub assigned_to: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status_text: Option<String>,
}

/// A validated issue ready to be inserted; the store assigns the id.
#[derive(Debug, Clone, Serialize)]
pub struct NewIssue {
    pub issue_title: String,
    pub issue_text: String,
    pub created_by: String,
    pub assigned_to: String,
    pub status_text: String,
    pub open: bool,
    #[serde(with = "iso_millis")]
    pub created_on: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub updated_on: DateTime<Utc>,
}

impl CreateIssueBody {
    pub fn validate(self, now: DateTime<Utc>) -> Result<NewIssue, Rejection> {
        let (Some(issue_title), Some(issue_text), Some(created_by)) = (
            non_empty(self.issue_title),
            non_empty(self.issue_text),
            non_empty(self.created_by),
        ) else {
            return Err(Rejection::RequiredFieldsMissing);
        };

        Ok(NewIssue {
            issue_title,
            issue_text,
            created_by,
            assigned_to: self.assigned_to.unwrap_or_default(),
            status_text: self.status_text.unwrap_or_default(),
            open: true,
            created_on: now,
            updated_on: now,
        })
    }
}

impl NewIssue {
    pub fn to_fields(&self) -> Result<Fields, serde_json::Error> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Ok(Fields::new()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateIssueBody {
    #[serde(rename = "_id", alias = "id", default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub issue_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub issue_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub assigned_to: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub open: Option<bool>,
}

/// The subset of fields an update will actually write. Empty strings have
/// already been dropped: an empty value means "leave as is", never "clear".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueChanges {
    pub issue_title: Option<String>,
    pub issue_text: Option<String>,
    pub created_by: Option<String>,
    pub assigned_to: Option<String>,
    pub status_text: Option<String>,
    pub open: Option<bool>,
}

impl UpdateIssueBody {
    /// Whether any field besides `_id` was supplied, empty or not.
    pub fn has_fields(&self) -> bool {
        self.issue_title.is_some()
            || self.issue_text.is_some()
            || self.created_by.is_some()
            || self.assigned_to.is_some()
            || self.status_text.is_some()
            || self.open.is_some()
    }

    pub fn into_changes(self) -> IssueChanges {
        IssueChanges {
            issue_title: non_empty(self.issue_title),
            issue_text: non_empty(self.issue_text),
            created_by: non_empty(self.created_by),
            assigned_to: non_empty(self.assigned_to),
            status_text: non_empty(self.status_text),
            open: self.open,
        }
    }
}

impl IssueChanges {
    pub fn is_empty(&self) -> bool {
        *self == IssueChanges::default()
    }

    /// `$set` document for these changes, stamped with `updated_on`.
    pub fn to_fields(&self, updated_on: DateTime<Utc>) -> Fields {
        let mut set = Fields::new();
        let strings = [
            ("issue_title", &self.issue_title),
            ("issue_text", &self.issue_text),
            ("created_by", &self.created_by),
            ("assigned_to", &self.assigned_to),
            ("status_text", &self.status_text),
        ];
        for (key, value) in strings {
            if let Some(v) = value {
                set.insert(key.into(), serde_json::Value::String(v.clone()));
            }
        }
        if let Some(open) = self.open {
            set.insert("open".into(), serde_json::Value::Bool(open));
        }
        set.insert(
            "updated_on".into(),
            serde_json::Value::String(format_timestamp(&updated_on)),
        );
        set
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteIssueBody {
    #[serde(rename = "_id", alias = "id", default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
}

/// Missing and empty identifiers are treated alike.
pub fn present_id(id: Option<String>) -> Option<String> {
    non_empty(id)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_body(title: &str, text: &str, by: &str) -> CreateIssueBody {
        CreateIssueBody {
            issue_title: Some(title.into()),
            issue_text: Some(text.into()),
            created_by: Some(by.into()),
            ..Default::default()
        }
    }

    #[test]
    fn validate_applies_defaults() {
        let now = now();
        let issue = create_body("T", "X", "A").validate(now).unwrap();
        assert_eq!(issue.assigned_to, "");
        assert_eq!(issue.status_text, "");
        assert!(issue.open);
        assert_eq!(issue.created_on, now);
        assert_eq!(issue.updated_on, now);
    }

    #[test]
    fn validate_rejects_empty_required_fields() {
        for body in [
            create_body("", "X", "A"),
            create_body("T", "", "A"),
            create_body("T", "X", ""),
            CreateIssueBody::default(),
        ] {
            assert_eq!(
                body.validate(now()).unwrap_err(),
                Rejection::RequiredFieldsMissing
            );
        }
    }

    #[test]
    fn timestamps_format_with_millis() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T12:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(&ts), "2024-05-01T12:00:00.500Z");
    }

    #[test]
    fn empty_strings_are_not_changes() {
        let body = UpdateIssueBody {
            id: Some("x".into()),
            issue_title: Some(String::new()),
            status_text: Some("triaged".into()),
            ..Default::default()
        };
        assert!(body.has_fields());
        let changes = body.into_changes();
        assert_eq!(changes.issue_title, None);
        assert_eq!(changes.status_text.as_deref(), Some("triaged"));
    }

    #[test]
    fn closing_is_a_change() {
        let body = UpdateIssueBody {
            id: Some("x".into()),
            open: Some(false),
            ..Default::default()
        };
        let changes = body.into_changes();
        assert!(!changes.is_empty());

        let set = changes.to_fields(now());
        assert_eq!(set["open"], serde_json::Value::Bool(false));
        assert!(set.contains_key("updated_on"));
        assert_eq!(set.len(), 2);
    }
}
