use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;

use crate::issues::{self, Reply};
use crate::payload;
use crate::store::StoreHandle;
use crate::types::Issue;

pub fn router(store: StoreHandle) -> Router {
    Router::new()
        .route(
            "/api/issues/{project}",
            get(list_issues)
                .post(create_issue)
                .put(update_issue)
                .delete(delete_issue),
        )
        .route("/status", get(status))
        .with_state(store)
}

/// Serves until SIGINT/SIGTERM, then closes the store.
pub async fn serve(listener: TcpListener, store: StoreHandle) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("issue tracker listening on {addr}");
    }

    let result = axum::serve(listener, router(store.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(err) = store.close() {
        tracing::warn!(%err, "failed to close store");
    }
    result
}

pub async fn start(addr: SocketAddr, store: StoreHandle) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, store).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(%err, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

async fn status() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// --- Issue endpoints ---

async fn list_issues(
    State(store): State<StoreHandle>,
    Path(project): Path<String>,
    RawQuery(query): RawQuery,
) -> Json<Vec<Issue>> {
    let filters = payload::query_pairs(query.as_deref());
    Json(issues::list(&store, &project, &filters))
}

async fn create_issue(
    State(store): State<StoreHandle>,
    Path(project): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Reply> {
    let body = payload::decode(&headers, &body);
    Json(issues::create(&store, &project, body))
}

async fn update_issue(
    State(store): State<StoreHandle>,
    Path(project): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Reply> {
    let body = payload::decode(&headers, &body);
    Json(issues::update(&store, &project, body))
}

async fn delete_issue(
    State(store): State<StoreHandle>,
    Path(project): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Reply> {
    let body = payload::decode(&headers, &body);
    Json(issues::delete(&store, &project, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use serde_json::{Value, json};

    async fn spawn_server() -> String {
        let store = StoreHandle::new(SqliteStore::open_in_memory().unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(store)).await.unwrap();
        });
        format!("http://{addr}/api/issues/apitest")
    }

    #[tokio::test]
    async fn full_lifecycle_over_http() {
        let url = spawn_server().await;
        let http = reqwest::Client::new();

        let created = http
            .post(&url)
            .json(&json!({ "issue_title": "T", "issue_text": "X", "created_by": "A" }))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), 200);
        let created: Value = created.json().await.unwrap();
        assert_eq!(created["open"], true);
        assert_eq!(created["assigned_to"], "");
        assert_eq!(created["status_text"], "");
        let id = created["_id"].as_str().unwrap().to_string();

        let updated: Value = http
            .put(&url)
            .json(&json!({ "_id": id, "issue_title": "T2" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(updated, json!({ "result": "successfully updated", "_id": id }));

        let listed: Value = http
            .get(format!("{url}?_id={id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["issue_title"], "T2");
        assert_eq!(listed[0]["issue_text"], "X");
        assert_eq!(listed[0]["created_on"], created["created_on"]);

        let deleted: Value = http
            .delete(&url)
            .json(&json!({ "_id": id }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(deleted, json!({ "result": "successfully deleted", "_id": id }));

        let listed: Value = http
            .get(format!("{url}?_id={id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed, json!([]));
    }

    #[tokio::test]
    async fn form_bodies_are_accepted() {
        let url = spawn_server().await;
        let http = reqwest::Client::new();

        let created: Value = http
            .post(&url)
            .header("content-type", "application/x-www-form-urlencoded")
            .body("issue_title=T&issue_text=X&created_by=A&assigned_to=")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(created["assigned_to"], "");
        let id = created["_id"].as_str().unwrap().to_string();

        let updated: Value = http
            .put(&url)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(format!("_id={id}&open=false&status_text="))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(updated["result"], "successfully updated");

        let closed: Value = http
            .get(format!("{url}?open=false"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(closed[0]["_id"], id.as_str());
    }

    #[tokio::test]
    async fn bad_bodies_still_get_json_replies() {
        let url = spawn_server().await;
        let http = reqwest::Client::new();

        for (method, expected) in [
            (reqwest::Method::POST, json!({ "error": "required field(s) missing" })),
            (reqwest::Method::PUT, json!({ "error": "missing _id" })),
            (reqwest::Method::DELETE, json!({ "error": "missing _id" })),
        ] {
            let resp = http
                .request(method, &url)
                .header("content-type", "application/json")
                .body("{oops")
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 200);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body, expected);
        }
    }

    #[tokio::test]
    async fn status_is_ok() {
        let url = spawn_server().await;
        let status_url = url.replace("/api/issues/apitest", "/status");
        let body: Value = reqwest::get(status_url).await.unwrap().json().await.unwrap();
        assert_eq!(body, json!({ "status": "ok" }));
    }
}
