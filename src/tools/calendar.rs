//! Calendar event scheduling through a webhook

use super::{Tool, ToolExecutionError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Spoken once the webhook accepts the event
pub const SCHEDULED_CONFIRMATION: &str = "All set. Your event has been added.";

pub struct CalendarWebhookTool {
    client: Client,
    webhook_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: String,
    time_zone: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CalendarEvent {
    summary: String,
    description: String,
    location: String,
    start: EventTime,
    end: EventTime,
}

impl CalendarWebhookTool {
    pub fn new(client: Client, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }
}

fn event_time_schema(what: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "dateTime": {
                "type": "string",
                "description": format!("{what} time in RFC 3339, e.g. 2025-06-03T15:00:00")
            },
            "timeZone": {
                "type": "string",
                "description": "IANA time zone, e.g. America/Los_Angeles"
            }
        },
        "required": ["dateTime", "timeZone"],
        "additionalProperties": false
    })
}

#[async_trait]
impl Tool for CalendarWebhookTool {
    fn name(&self) -> &'static str {
        "schedule_calendar_event"
    }

    fn description(&self) -> String {
        "Adds an event to the caller's calendar. Confirm the title, day and time with the caller before calling.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string", "description": "Title of the event"},
                "description": {"type": "string", "description": "Details, or empty"},
                "location": {"type": "string", "description": "Location, or empty"},
                "start": event_time_schema("Start"),
                "end": event_time_schema("End")
            },
            "required": ["summary", "description", "location", "start", "end"],
            "additionalProperties": false
        })
    }

    async fn run(&self, input: Value) -> Result<String, ToolExecutionError> {
        let event: CalendarEvent = serde_json::from_value(input)
            .map_err(|e| ToolExecutionError::InvalidInput(e.to_string()))?;

        let response = self
            .client
            .post(&self.webhook_url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(&event)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ToolExecutionError::Upstream(format!(
                "webhook returned {status}: {body}"
            )));
        }

        tracing::info!(summary = %event.summary, "Calendar event sent to webhook");
        tracing::debug!(response = %body, "Webhook response");
        Ok(SCHEDULED_CONFIRMATION.to_string())
    }
}
