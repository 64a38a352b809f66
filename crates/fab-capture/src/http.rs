use anyhow::Result;
use async_trait::async_trait;

use fab_protocol::{Command, Reply};

use crate::relay::CommandSink;
use crate::transport::build_client;

/// [`CommandSink`] speaking to the bridge server's HTTP command surface.
pub struct HttpCommandSink {
    base: String,
    client: reqwest::Client,
}

impl HttpCommandSink {
    pub fn new(base: impl Into<String>) -> Self {
        HttpCommandSink {
            base: base.into(),
            client: build_client(),
        }
    }

    fn commands_url(&self) -> String {
        format!("{}/commands", self.base.trim_end_matches('/'))
    }
}

#[async_trait]
impl CommandSink for HttpCommandSink {
    async fn send(&self, command: Command) -> Result<Reply> {
        let resp = self
            .client
            .post(self.commands_url())
            .json(&command)
            .send()
            .await?;
        let reply = resp.error_for_status()?.json::<Reply>().await?;
        Ok(reply)
    }
}
