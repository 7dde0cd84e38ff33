//! Programming joke lookup against jokeapi.dev

use super::{Tool, ToolExecutionError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const JOKE_API_URL: &str = "https://v2.jokeapi.dev/joke/Programming?safe-mode";
const JOKE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ProgrammingJokeTool {
    client: Client,
    url: String,
    timeout: Duration,
}

/// jokeapi.dev response; `type` decides which fields are set
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum JokeResponse {
    Single { joke: String },
    Twopart { setup: String, delivery: String },
}

impl ProgrammingJokeTool {
    pub fn new(client: Client) -> Self {
        Self::with_url(client, JOKE_API_URL)
    }

    pub fn with_url(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            timeout: JOKE_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for ProgrammingJokeTool {
    fn name(&self) -> &'static str {
        "get_programming_joke"
    }

    fn description(&self) -> String {
        "Fetches a programming joke".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": [],
            "additionalProperties": false
        })
    }

    async fn run(&self, _input: Value) -> Result<String, ToolExecutionError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolExecutionError::Upstream(format!(
                "joke service returned {status}"
            )));
        }

        let joke: JokeResponse = response.json().await?;
        Ok(match joke {
            JokeResponse::Single { joke } => joke,
            JokeResponse::Twopart { setup, delivery } => format!("{setup} ... {delivery}"),
        })
    }
}
