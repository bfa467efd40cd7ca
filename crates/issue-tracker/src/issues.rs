use serde::Serialize;
use serde_json::Value;

use crate::error::{ErrorResponse, Rejection, StoreError};
use crate::id::IssueId;
use crate::store::{Document, Filter, StoreHandle};
use crate::types::{
    self, CreateIssueBody, DeleteIssueBody, ISSUE_FIELDS, Issue, NewIssue, UpdateIssueBody,
    present_id,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    #[serde(rename = "successfully updated")]
    Updated,
    #[serde(rename = "successfully deleted")]
    Deleted,
}

/// What every operation resolves to. Store failures never reach the
/// transport; they collapse into the generic `could not <verb>` replies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Issue(Issue),
    Done {
        result: Outcome,
        #[serde(rename = "_id")]
        id: String,
    },
    Failed(ErrorResponse),
}

impl Reply {
    fn rejected(error: Rejection, id: Option<String>) -> Reply {
        Reply::Failed(ErrorResponse { error, id })
    }
}

/// Issues of project `foo` live in collection `foo-issues`.
pub fn collection_name(project: &str) -> String {
    format!("{project}-issues")
}

/// Translates query parameters into a store filter. `None` means no document
/// can match: a malformed identifier or `open` value, or a field issues do
/// not have.
pub fn filter_from_query(pairs: &[(String, String)]) -> Option<Filter> {
    let mut filter = Filter::new();
    for (key, raw) in pairs {
        match key.as_str() {
            "_id" | "id" => {
                let id = IssueId::parse(raw).ok()?;
                if filter.id.is_some_and(|existing| existing != id) {
                    return None;
                }
                filter = filter.id(id);
            }
            "open" => {
                let open = match raw.as_str() {
                    "true" => true,
                    "false" => false,
                    _ => return None,
                };
                filter = filter.where_eq("open", open);
            }
            field if ISSUE_FIELDS.contains(&field) => {
                filter = filter.where_eq(field, Value::String(raw.clone()));
            }
            _ => return None,
        }
    }
    Some(filter)
}

pub fn list(store: &StoreHandle, project: &str, query: &[(String, String)]) -> Vec<Issue> {
    let Some(filter) = filter_from_query(query) else {
        tracing::debug!(project, ?query, "filter cannot match any issue");
        return Vec::new();
    };

    let docs = match store.find(&collection_name(project), &filter) {
        Ok(docs) => docs,
        Err(err) => {
            tracing::warn!(project, %err, "failed to list issues");
            return Vec::new();
        }
    };

    docs.into_iter()
        .filter_map(|doc| {
            let id = doc.id;
            Issue::try_from(doc)
                .inspect_err(|err| tracing::warn!(project, %id, %err, "skipping malformed issue"))
                .ok()
        })
        .collect()
}

fn insert_issue(
    store: &StoreHandle,
    collection: &str,
    new_issue: &NewIssue,
) -> Result<Issue, StoreError> {
    let fields = new_issue.to_fields()?;
    let id = store.insert_one(collection, &fields)?;
    Issue::try_from(Document { id, fields }).map_err(|e| StoreError::Corrupt {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

pub fn create(store: &StoreHandle, project: &str, body: CreateIssueBody) -> Reply {
    let new_issue = match body.validate(types::now()) {
        Ok(issue) => issue,
        Err(rejection) => return Reply::rejected(rejection, None),
    };

    match insert_issue(store, &collection_name(project), &new_issue) {
        Ok(issue) => {
            tracing::info!(project, id = %issue.id, "issue created");
            Reply::Issue(issue)
        }
        Err(err) => {
            tracing::warn!(project, %err, "failed to save issue");
            Reply::rejected(Rejection::CouldNotSave, None)
        }
    }
}

pub fn update(store: &StoreHandle, project: &str, body: UpdateIssueBody) -> Reply {
    let Some(raw_id) = present_id(body.id.clone()) else {
        return Reply::rejected(Rejection::MissingId, None);
    };
    if !body.has_fields() {
        return Reply::rejected(Rejection::NoUpdateFields, Some(raw_id));
    }

    let changes = body.into_changes();
    if changes.is_empty() {
        tracing::debug!(project, id = %raw_id, "all update fields empty, refreshing updated_on only");
    }

    let id = match IssueId::parse(&raw_id) {
        Ok(id) => id,
        Err(err) => {
            tracing::debug!(project, %err, "update with malformed id");
            return Reply::rejected(Rejection::CouldNotUpdate, Some(raw_id));
        }
    };

    let set = changes.to_fields(types::now());
    match store.update_one(&collection_name(project), id, &set) {
        Ok(1) => {
            tracing::info!(project, %id, "issue updated");
            Reply::Done {
                result: Outcome::Updated,
                id: raw_id,
            }
        }
        Ok(modified) => {
            tracing::debug!(project, %id, modified, "update matched no issue");
            Reply::rejected(Rejection::CouldNotUpdate, Some(raw_id))
        }
        Err(err) => {
            tracing::warn!(project, %id, %err, "failed to update issue");
            Reply::rejected(Rejection::CouldNotUpdate, Some(raw_id))
        }
    }
}

pub fn delete(store: &StoreHandle, project: &str, body: DeleteIssueBody) -> Reply {
    let Some(raw_id) = present_id(body.id) else {
        return Reply::rejected(Rejection::MissingId, None);
    };

    let id = match IssueId::parse(&raw_id) {
        Ok(id) => id,
        Err(err) => {
            tracing::debug!(project, %err, "delete with malformed id");
            return Reply::rejected(Rejection::CouldNotDelete, Some(raw_id));
        }
    };

    match store.delete_one(&collection_name(project), id) {
        Ok(1) => {
            tracing::info!(project, %id, "issue deleted");
            Reply::Done {
                result: Outcome::Deleted,
                id: raw_id,
            }
        }
        Ok(deleted) => {
            tracing::debug!(project, %id, deleted, "delete matched no issue");
            Reply::rejected(Rejection::CouldNotDelete, Some(raw_id))
        }
        Err(err) => {
            tracing::warn!(project, %id, %err, "failed to delete issue");
            Reply::rejected(Rejection::CouldNotDelete, Some(raw_id))
        }
    }
}
