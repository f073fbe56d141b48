use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::commands::{
    DbCommand, DbResult, NewColumn, NewRow, NewTable, RowLookup, RowOutcome, RowQuery, RowUpdate,
};
use crate::db::DbHandle;
use crate::db_types::{RowId, TableId};
use crate::error::DbError;

pub fn create_router(db: DbHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tables", get(list_tables))
        .route("/tables/:table/rows/:row", get(get_row))
        .route("/table/new", post(new_table))
        .route("/column/new", post(new_column))
        .route("/row/new", post(new_row))
        .route("/row/get", post(get_rows))
        .route("/row/update", post(update_rows))
        .route("/row/delete", post(delete_rows))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(db)
}

async fn health() -> &'static str {
    "ok"
}

async fn list_tables(State(db): State<DbHandle>) -> Response {
    respond(db.call(DbCommand::GetTables).await)
}

async fn get_row(
    State(db): State<DbHandle>,
    Path((table, row_id)): Path<(TableId, RowId)>,
) -> Response {
    respond(db.call(DbCommand::GetRow(RowLookup { table, row_id })).await)
}

/// Body as decoded by axum. A rejection is answered with the usual error
/// envelope instead of axum's plain-text body.
type Body<T> = Result<Json<T>, JsonRejection>;

async fn new_table(State(db): State<DbHandle>, body: Body<NewTable>) -> Response {
    dispatch(db, body, DbCommand::CreateTable).await
}

async fn new_column(State(db): State<DbHandle>, body: Body<NewColumn>) -> Response {
    dispatch(db, body, DbCommand::CreateColumn).await
}

async fn new_row(State(db): State<DbHandle>, body: Body<NewRow>) -> Response {
    dispatch(db, body, DbCommand::InsertRow).await
}

async fn get_rows(State(db): State<DbHandle>, body: Body<RowQuery>) -> Response {
    dispatch(db, body, DbCommand::Select).await
}

async fn update_rows(State(db): State<DbHandle>, body: Body<RowUpdate>) -> Response {
    dispatch(db, body, DbCommand::UpdateRows).await
}

async fn delete_rows(State(db): State<DbHandle>, body: Body<RowQuery>) -> Response {
    dispatch(db, body, DbCommand::DeleteRows).await
}

async fn dispatch<T>(db: DbHandle, body: Body<T>, cmd: impl FnOnce(T) -> DbCommand) -> Response {
    match body {
        Ok(Json(req)) => respond(db.call(cmd(req)).await),
        Err(rejection) => (
            rejection.status(),
            Json(invalid_json(&rejection.body_text())),
        )
            .into_response(),
    }
}

fn respond(result: Result<DbResult, DbError>) -> Response {
    match result {
        Ok(result) => Json(result_to_json(&result)).into_response(),
        Err(err) => (status_for(&err), Json(error_to_json(&err))).into_response(),
    }
}

fn status_for(err: &DbError) -> StatusCode {
    match err {
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        DbError::DuplicateColumn(_) => StatusCode::CONFLICT,
        DbError::TooManyTables(_) => StatusCode::INSUFFICIENT_STORAGE,
        DbError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

pub fn result_to_json(result: &DbResult) -> serde_json::Value {
    match result {
        DbResult::Id(id) => json!({"ok": true, "id": id}),
        DbResult::Row(row) => json!({"ok": true, "row": row}),
        DbResult::Rows(rows) => json!({"ok": true, "rows": rows}),
        DbResult::Outcomes(outcomes) => {
            let results: Vec<_> = outcomes.iter().map(outcome_to_json).collect();
            json!({"ok": true, "results": results})
        }
        DbResult::Tables(tables) => json!({"ok": true, "tables": tables}),
    }
}

fn outcome_to_json(outcome: &RowOutcome) -> serde_json::Value {
    match &outcome.result {
        Ok(()) => json!({"id": outcome.id, "ok": true}),
        Err(err) => json!({"id": outcome.id, "ok": false, "error": err.to_string()}),
    }
}

pub fn error_to_json(err: &DbError) -> serde_json::Value {
    json!({
        "ok": false,
        "error": {"kind": err.kind(), "message": err.to_string()}
    })
}

fn invalid_json(message: &str) -> serde_json::Value {
    json!({
        "ok": false,
        "error": {"kind": "InvalidJson", "message": message}
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(db): State<DbHandle>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, db))
}

async fn handle_socket(mut socket: WebSocket, db: DbHandle) {
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else {
            continue;
        };

        let response = match serde_json::from_str::<DbCommand>(&text) {
            Ok(cmd) => match db.call(cmd).await {
                Ok(result) => result_to_json(&result),
                Err(err) => error_to_json(&err),
            },
            Err(e) => invalid_json(&e.to_string()),
        };

        if socket.send(Message::Text(response.to_string().into())).await.is_err() {
            break;
        }
    }
    tracing::debug!("websocket closed");
}
