use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use fab_protocol::{Command, Reply, ERR_UNKNOWN_MESSAGE_TYPE};
use fab_store::DIAG_LOG_CAPACITY;
use fab_topics::{TOPIC_ENTITLEMENTS_CLEARED, TOPIC_ENTITLEMENTS_UPDATED};

use crate::AppState;

/// Single command endpoint. The body is taken as raw JSON first so a
/// request with an unrecognized `type` gets the protocol-level error
/// reply instead of a transport-level 4xx.
pub async fn handle_command(
    State(state): State<AppState>,
    Json(raw): Json<Value>,
) -> Json<Reply> {
    let cmd: Command = match serde_json::from_value(raw) {
        Ok(cmd) => cmd,
        Err(err) => {
            tracing::debug!(%err, "unparseable command");
            return Json(Reply::err(ERR_UNKNOWN_MESSAGE_TYPE));
        }
    };
    Json(dispatch(&state, cmd).await)
}

pub(crate) async fn dispatch(state: &AppState, cmd: Command) -> Reply {
    match cmd {
        Command::SaveEntitlements { items } => save_entitlements(state, items).await,
        Command::GetEntitlements => get_entitlements(state).await,
        Command::ClearEntitlements => clear_entitlements(state).await,
        Command::Ping => Reply::pong(chrono::Utc::now().timestamp_millis()),
        Command::Log {
            level,
            message,
            data,
        } => append_log(state, level, message, data).await,
        Command::GetLogs => get_logs(state).await,
        Command::ClearLogs => clear_logs(state).await,
    }
}

async fn save_entitlements(state: &AppState, items: Vec<Value>) -> Reply {
    // An empty batch neither opens a transaction nor fans out an event.
    if items.is_empty() {
        return Reply::saved(0);
    }
    match state.store().upsert_many_async(items).await {
        Ok(outcome) => {
            if outcome.errors > 0 {
                tracing::warn!(
                    errors = outcome.errors,
                    saved = outcome.saved,
                    "batch had unsaveable entitlements"
                );
            }
            state
                .bus()
                .publish(TOPIC_ENTITLEMENTS_UPDATED, &json!({"count": outcome.saved}));
            Reply::saved(outcome.saved)
        }
        Err(err) => Reply::err(err.to_string()),
    }
}

async fn get_entitlements(state: &AppState) -> Reply {
    match state.store().get_all_async().await {
        Ok(data) => Reply::data(data),
        Err(err) => Reply::err(err.to_string()),
    }
}

async fn clear_entitlements(state: &AppState) -> Reply {
    match state.store().clear_all_async().await {
        Ok(()) => {
            state.bus().publish(TOPIC_ENTITLEMENTS_CLEARED, &json!({}));
            Reply::ack()
        }
        Err(err) => Reply::err(err.to_string()),
    }
}

async fn append_log(
    state: &AppState,
    level: String,
    message: String,
    data: Option<Value>,
) -> Reply {
    match state.store().append_diag_async(level, message, data).await {
        Ok(()) => Reply::ack(),
        Err(err) => Reply::err(err.to_string()),
    }
}

async fn get_logs(state: &AppState) -> Reply {
    match state.store().recent_diag_async(DIAG_LOG_CAPACITY).await {
        Ok(logs) => Reply::logs(logs),
        Err(err) => Reply::err(err.to_string()),
    }
}

async fn clear_logs(state: &AppState) -> Reply {
    match state.store().clear_diag_async().await {
        Ok(()) => Reply::ack(),
        Err(err) => Reply::err(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = AppState::new(
            fab_events::Bus::new(64),
            fab_store::Store::new(dir.path()),
        );
        (state, dir)
    }

    #[tokio::test]
    async fn save_persists_and_notifies() {
        let (state, _dir) = test_state();
        let mut rx = state.bus().subscribe();

        let reply = dispatch(
            &state,
            Command::SaveEntitlements {
                items: vec![json!({"uid": "a"}), json!({"uid": "b"})],
            },
        )
        .await;
        assert_eq!(reply, Reply::saved(2));

        let env = rx.try_recv().expect("event");
        assert_eq!(env.kind, TOPIC_ENTITLEMENTS_UPDATED);
        assert_eq!(env.payload["count"], 2);
        assert_eq!(state.store().count().expect("count"), 2);
    }

    #[tokio::test]
    async fn empty_save_is_a_silent_no_op() {
        let (state, _dir) = test_state();
        let mut rx = state.bus().subscribe();

        let reply = dispatch(&state, Command::SaveEntitlements { items: vec![] }).await;
        assert_eq!(reply, Reply::saved(0));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(state.store().count().expect("count"), 0);
    }

    #[tokio::test]
    async fn unsaveable_items_do_not_sink_the_batch() {
        let (state, _dir) = test_state();
        let mut rx = state.bus().subscribe();

        let reply = dispatch(
            &state,
            Command::SaveEntitlements {
                items: vec![json!({"title": "keyless"}), json!({"uid": "ok"})],
            },
        )
        .await;
        assert_eq!(reply, Reply::saved(1));
        assert_eq!(rx.try_recv().expect("event").payload["count"], 1);
    }

    #[tokio::test]
    async fn get_returns_records_in_uid_order() {
        let (state, _dir) = test_state();
        dispatch(
            &state,
            Command::SaveEntitlements {
                items: vec![json!({"uid": "zz"}), json!({"uid": "aa"})],
            },
        )
        .await;

        let reply = dispatch(&state, Command::GetEntitlements).await;
        match reply {
            Reply::Data { ok, data } => {
                assert!(ok);
                assert_eq!(data[0]["uid"], "aa");
                assert_eq!(data[1]["uid"], "zz");
                assert!(data[0]["savedAt"].is_string());
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn clear_notifies_and_empties() {
        let (state, _dir) = test_state();
        dispatch(
            &state,
            Command::SaveEntitlements {
                items: vec![json!({"uid": "a"})],
            },
        )
        .await;

        let mut rx = state.bus().subscribe();
        let reply = dispatch(&state, Command::ClearEntitlements).await;
        assert_eq!(reply, Reply::ack());
        assert_eq!(rx.try_recv().expect("event").kind, TOPIC_ENTITLEMENTS_CLEARED);
        assert_eq!(state.store().count().expect("count"), 0);
    }

    #[tokio::test]
    async fn ping_answers_with_epoch_millis() {
        let (state, _dir) = test_state();
        match dispatch(&state, Command::Ping).await {
            Reply::Pong { ok, timestamp } => {
                assert!(ok);
                // Sanity: later than 2020-01-01 in milliseconds.
                assert!(timestamp > 1_577_836_800_000);
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn log_commands_round_trip() {
        let (state, _dir) = test_state();
        let reply = dispatch(
            &state,
            Command::Log {
                level: "warn".to_string(),
                message: "relay hiccup".to_string(),
                data: Some(json!({"attempt": 1})),
            },
        )
        .await;
        assert_eq!(reply, Reply::ack());

        match dispatch(&state, Command::GetLogs).await {
            Reply::Logs { ok, logs } => {
                assert!(ok);
                assert_eq!(logs.len(), 1);
                assert_eq!(logs[0].level, "warn");
                assert_eq!(logs[0].message, "relay hiccup");
                assert_eq!(logs[0].data, Some(json!({"attempt": 1})));
            }
            other => panic!("unexpected reply {other:?}"),
        }

        assert_eq!(dispatch(&state, Command::ClearLogs).await, Reply::ack());
        match dispatch(&state, Command::GetLogs).await {
            Reply::Logs { logs, .. } => assert!(logs.is_empty()),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_type_gets_the_protocol_error() {
        let (state, _dir) = test_state();
        for raw in [json!({"type": "BOGUS"}), json!({"items": []}), json!(42)] {
            let Json(reply) = handle_command(State(state.clone()), Json(raw)).await;
            assert_eq!(reply, Reply::err(ERR_UNKNOWN_MESSAGE_TYPE));
        }
    }

    #[tokio::test]
    async fn malformed_items_coerce_to_the_empty_batch() {
        let (state, _dir) = test_state();
        let mut rx = state.bus().subscribe();
        let Json(reply) = handle_command(
            State(state.clone()),
            Json(json!({"type": "SAVE_ENTITLEMENTS", "items": "oops"})),
        )
        .await;
        assert_eq!(reply, Reply::saved(0));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }
}
