use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(#[source] rusqlite::Error),
    #[error("failed to create database directory: {0}")]
    Dir(#[from] std::io::Error),
    #[error("migration failed: {0}")]
    Migration(#[source] rusqlite::Error),
    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("corrupt document {id}: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("store is closed")]
    Closed,
    #[error("store lock poisoned")]
    Poisoned,
}

/// Client-facing failure messages. These strings are the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum Rejection {
    #[serde(rename = "required field(s) missing")]
    #[error("required field(s) missing")]
    RequiredFieldsMissing,
    #[serde(rename = "could not save an issue")]
    #[error("could not save an issue")]
    CouldNotSave,
    #[serde(rename = "missing _id")]
    #[error("missing _id")]
    MissingId,
    #[serde(rename = "no update field(s) sent")]
    #[error("no update field(s) sent")]
    NoUpdateFields,
    #[serde(rename = "could not update")]
    #[error("could not update")]
    CouldNotUpdate,
    #[serde(rename = "could not delete")]
    #[error("could not delete")]
    CouldNotDelete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: Rejection,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl From<Rejection> for ErrorResponse {
    fn from(error: Rejection) -> Self {
        ErrorResponse { error, id: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejection_serializes_as_message() {
        let body = serde_json::to_value(ErrorResponse::from(Rejection::MissingId)).unwrap();
        assert_eq!(body, json!({ "error": "missing _id" }));
    }

    #[test]
    fn id_is_echoed_when_known() {
        let body = serde_json::to_value(ErrorResponse {
            error: Rejection::CouldNotDelete,
            id: Some("test-id".into()),
        })
        .unwrap();
        assert_eq!(body, json!({ "error": "could not delete", "_id": "test-id" }));
    }

    #[test]
    fn display_matches_wire() {
        for r in [
            Rejection::RequiredFieldsMissing,
            Rejection::CouldNotSave,
            Rejection::MissingId,
            Rejection::NoUpdateFields,
            Rejection::CouldNotUpdate,
            Rejection::CouldNotDelete,
        ] {
            assert_eq!(serde_json::to_value(r).unwrap(), json!(r.to_string()));
        }
    }
}
