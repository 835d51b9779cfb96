//! stream-latest-logs: bridges [`crate::logs::push::stream_task_logs`]'s
//! channel onto an axum websocket connection (§4.5 "Push").

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::debug;

use crate::context::Context;
use crate::logs::push::stream_task_logs as drive_push_loop;

pub async fn stream_task_logs(
    State(ctx): State<Context>,
    Path(task_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(ctx, task_id, socket))
}

async fn handle_socket(ctx: Context, task_id: String, mut socket: WebSocket) {
    ctx.metrics
        .push_stream_connections
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

    let (tx, mut rx) = mpsc::channel(4);
    let driver = tokio::spawn(drive_push_loop(ctx, task_id.clone(), tx));

    while let Some(frame) = rx.recv().await {
        let Ok(text) = serde_json::to_string(&frame) else {
            break;
        };
        if socket.send(Message::Text(text.into())).await.is_err() {
            debug!(task_id, "client disconnected from log stream");
            break;
        }
    }

    driver.abort();
    let _ = socket.close().await;
}
