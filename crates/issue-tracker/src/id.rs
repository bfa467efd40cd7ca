use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Store-assigned primary key of an issue document.
///
/// UUIDv7, so identifiers generated later sort after earlier ones. The wire
/// form is the hyphenated lowercase string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IssueId(Uuid);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed identifier: {0:?}")]
pub struct MalformedId(pub String);

impl IssueId {
    pub fn generate() -> Self {
        IssueId(Uuid::now_v7())
    }

    pub fn parse(s: &str) -> Result<Self, MalformedId> {
        // Only the canonical hyphenated form is accepted; braced, urn and
        // simple forms would give one document several spellings.
        if s.len() != 36 {
            return Err(MalformedId(s.to_string()));
        }
        Uuid::try_parse(s)
            .map(IssueId)
            .map_err(|_| MalformedId(s.to_string()))
    }
}

impl FromStr for IssueId {
    type Err = MalformedId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IssueId::parse(s)
    }
}

impl TryFrom<String> for IssueId {
    type Error = MalformedId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        IssueId::parse(&s)
    }
}

impl From<IssueId> for String {
    fn from(id: IssueId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}
