//! Today's date, for resolving "tomorrow" and weekday references

use super::{Tool, ToolExecutionError};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct TodaysDateTool;

#[async_trait]
impl Tool for TodaysDateTool {
    fn name(&self) -> &'static str {
        "get_todays_date"
    }

    fn description(&self) -> String {
        "Returns today's date in YYYY-MM-DD format. Use it before scheduling anything relative to today.".to_string()
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
        Ok(chrono::Local::now().format("%Y-%m-%d").to_string())
    }
}
