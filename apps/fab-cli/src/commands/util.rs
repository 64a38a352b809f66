use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use reqwest::blocking::Client;
use serde_json::Value;

use fab_protocol::{Command, Reply};

pub(crate) fn client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(format!("fab-cli/{}", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .context("building http client")
}

/// Client without a request timeout, for endpoints that stream forever.
pub(crate) fn streaming_client() -> Result<Client> {
    Client::builder()
        .user_agent(format!("fab-cli/{}", env!("CARGO_PKG_VERSION")))
        .timeout(None)
        .build()
        .context("building http client")
}

pub(crate) fn commands_url(base: &str) -> String {
    format!("{}/commands", base.trim_end_matches('/'))
}

pub(crate) fn events_url(base: &str, prefix: Option<&str>) -> String {
    let mut url = format!("{}/events", base.trim_end_matches('/'));
    if let Some(p) = prefix.filter(|p| !p.is_empty()) {
        url.push_str("?prefix=");
        url.push_str(p);
    }
    url
}

/// POST one command to the bridge server and parse the reply envelope.
pub(crate) fn send_command(base: &str, timeout_secs: u64, command: &Command) -> Result<Reply> {
    let resp = client(timeout_secs)?
        .post(commands_url(base))
        .json(command)
        .send()
        .with_context(|| format!("sending command to {}", commands_url(base)))?
        .error_for_status()
        .context("command endpoint returned an error status")?;
    resp.json::<Reply>().context("parsing command reply")
}

/// Fetch the full store contents, unwrapping the data reply.
pub(crate) fn fetch_entitlements(base: &str, timeout_secs: u64) -> Result<Vec<Value>> {
    match send_command(base, timeout_secs, &Command::GetEntitlements)? {
        Reply::Data { data, .. } => Ok(data),
        Reply::Err { error, .. } => bail!("server refused: {error}"),
        other => bail!("unexpected reply {other:?}"),
    }
}

/// Compact age for a stored RFC3339 stamp; unparseable input is shown
/// verbatim.
pub(crate) fn format_relative(ts: &str) -> String {
    let Ok(parsed) = DateTime::parse_from_rfc3339(ts) else {
        return ts.to_string();
    };
    let delta = Utc::now().signed_duration_since(parsed.with_timezone(&Utc));
    if delta.num_seconds() < 60 {
        "just now".to_string()
    } else if delta.num_minutes() < 60 {
        format!("{}m ago", delta.num_minutes())
    } else if delta.num_hours() < 24 {
        format!("{}h ago", delta.num_hours())
    } else {
        parsed.with_timezone(&Local).format("%Y-%m-%d").to_string()
    }
}

/// Ask before a destructive action. Only `y`/`yes` proceeds.
pub(crate) fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush().context("flushing prompt")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading confirmation")?;
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn send_command_round_trips_the_wire_shapes() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/commands")
                .json_body(json!({"type": "PING"}));
            then.status(200)
                .json_body(json!({"ok": true, "timestamp": 1700000000000i64}));
        });

        let reply = send_command(&server.base_url(), 5, &Command::Ping).expect("reply");
        assert_eq!(reply, Reply::pong(1700000000000));
        mock.assert();
    }

    #[test]
    fn fetch_entitlements_unwraps_data() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/commands")
                .json_body(json!({"type": "GET_ENTITLEMENTS"}));
            then.status(200)
                .json_body(json!({"ok": true, "data": [{"uid": "a"}]}));
        });

        let data = fetch_entitlements(&server.base_url(), 5).expect("data");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["uid"], "a");
    }

    #[test]
    fn fetch_entitlements_surfaces_protocol_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/commands");
            then.status(200)
                .json_body(json!({"ok": false, "error": "storage exploded"}));
        });

        let err = fetch_entitlements(&server.base_url(), 5).expect_err("error");
        assert!(err.to_string().contains("storage exploded"));
    }

    #[test]
    fn urls_tolerate_trailing_slashes() {
        assert_eq!(commands_url("http://h:1/"), "http://h:1/commands");
        assert_eq!(events_url("http://h:1", None), "http://h:1/events");
        assert_eq!(
            events_url("http://h:1/", Some("ENTITLEMENTS_")),
            "http://h:1/events?prefix=ENTITLEMENTS_"
        );
    }

    #[test]
    fn relative_times_bucket_sensibly() {
        let now = Utc::now();
        let fmt = |secs: i64| {
            (now - chrono::Duration::seconds(secs))
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        };
        assert_eq!(format_relative(&fmt(10)), "just now");
        assert_eq!(format_relative(&fmt(5 * 60)), "5m ago");
        assert_eq!(format_relative(&fmt(3 * 3600)), "3h ago");
        assert!(format_relative(&fmt(3 * 86400)).starts_with('2'));
        assert_eq!(format_relative("not a stamp"), "not a stamp");
    }
}
