use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use tokio_stream::StreamExt as _;

use crate::AppState;

/// Live event stream. Events are emitted as they happen; the bus keeps
/// no history, so a reconnecting observer re-reads the store instead of
/// expecting a replay.
pub async fn events_sse(
    State(state): State<AppState>,
    Query(q): Query<std::collections::HashMap<String, String>>,
) -> impl IntoResponse {
    // Optional prefix filter (CSV)
    let prefixes = parse_prefixes(q.get("prefix").map(String::as_str));
    let mut bus_rx = state.bus().subscribe();
    let (tx, rx) = tokio::sync::mpsc::channel::<fab_events::Envelope>(128);
    tokio::spawn(async move {
        while let Ok(env) = bus_rx.recv().await {
            if prefixes.is_empty() || prefixes.iter().any(|p| env.kind.starts_with(p)) {
                if tx.send(env).await.is_err() {
                    break;
                }
            }
        }
    });
    let stream = tokio_stream::wrappers::ReceiverStream::new(rx).map(|env| {
        let data = serde_json::to_string(&env).unwrap_or_else(|_| "{}".to_string());
        Result::<SseEvent, std::convert::Infallible>::Ok(
            SseEvent::default().event(env.kind.clone()).data(data),
        )
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(10))
            .text("keep-alive"),
    )
}

fn parse_prefixes(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_csv_is_trimmed_and_pruned() {
        assert!(parse_prefixes(None).is_empty());
        assert!(parse_prefixes(Some("")).is_empty());
        assert_eq!(
            parse_prefixes(Some("ENTITLEMENTS_, service. ,")),
            vec!["ENTITLEMENTS_".to_string(), "service.".to_string()]
        );
    }
}
