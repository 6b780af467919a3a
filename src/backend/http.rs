use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use crate::backend::{
    AttendanceApi, LeaveApi, LeaveConflict, ProfileApi, PunchAck, PunchSubmission, TodayStatus,
};
use crate::common::config::ApiConfig;
use crate::common::{PunchError, Result};
use crate::flow::punch::Direction;

/// REST client for the attendance server.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PunchError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if !status.is_success() {
            let message = extract_error(&body, status);
            tracing::warn!("Server rejected request ({}): {}", status, message);
            return Err(PunchError::Rejected(message));
        }
        Ok(body)
    }
}

fn transport_error(e: reqwest::Error) -> PunchError {
    if e.is_timeout() {
        PunchError::Timeout
    } else {
        tracing::warn!("HTTP transport error: {}", e);
        PunchError::Network(e.to_string())
    }
}

/// The server's own failure text, which the remediation UI classifies.
pub(crate) fn extract_error(body: &Value, status: StatusCode) -> String {
    for key in ["error", "detail", "message"] {
        if let Some(text) = body.get(key).and_then(Value::as_str) {
            if !text.trim().is_empty() {
                return text.to_string();
            }
        }
    }

    // Field validation errors: {"latitude": ["This field is required."]}
    if let Some(fields) = body.as_object() {
        for (field, errors) in fields {
            if let Some(first) = errors.as_array().and_then(|a| a.first()).and_then(Value::as_str) {
                return format!("{}: {}", field, first);
            }
        }
    }

    format!("Request failed with status {}", status.as_u16())
}

#[derive(Deserialize)]
struct LeaveCheck {
    #[serde(default)]
    has_leave: bool,
    leave_id: Option<u64>,
    leave_type: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    #[serde(default)]
    message: String,
}

pub(crate) fn parse_leave_check(body: Value) -> Result<Option<LeaveConflict>> {
    let check: LeaveCheck = serde_json::from_value(body)?;
    if !check.has_leave {
        return Ok(None);
    }

    match (check.leave_id, check.start_date, check.end_date) {
        (Some(leave_id), Some(start_date), Some(end_date)) => Ok(Some(LeaveConflict {
            leave_id,
            leave_type: check.leave_type.unwrap_or_else(|| "Leave".to_string()),
            start_date,
            end_date,
            message: check.message,
        })),
        _ => Err(PunchError::InvalidInput(
            "Leave check response is missing leave details".to_string(),
        )),
    }
}

/// Stored descriptor text from a profile body. Blank means not enrolled.
pub(crate) fn parse_profile_descriptor(body: &Value) -> Option<String> {
    match body.get("face_descriptor") {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
        Some(array @ Value::Array(_)) => Some(array.to_string()),
        _ => None,
    }
}

fn punch_path(direction: Direction) -> &'static str {
    match direction {
        Direction::In => "/attendance/punch-in/",
        Direction::Out => "/attendance/punch-out/",
    }
}

#[async_trait]
impl AttendanceApi for HttpBackend {
    async fn punch(&self, submission: &PunchSubmission) -> Result<PunchAck> {
        tracing::info!(
            "Submitting punch {} (face_verified={})",
            submission.direction,
            submission.face_verified
        );
        let body = self
            .send(self.request(Method::POST, punch_path(submission.direction)).json(submission))
            .await?;
        Ok(serde_json::from_value(body).unwrap_or_default())
    }

    async fn today_status(&self) -> Result<TodayStatus> {
        let body = self.send(self.request(Method::GET, "/attendance/today/")).await?;
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait]
impl LeaveApi for HttpBackend {
    async fn today_leave_conflict(&self, user_id: &str) -> Result<Option<LeaveConflict>> {
        tracing::debug!("Checking today's leave for {}", user_id);
        let body = self.send(self.request(Method::GET, "/leaves/check-today-leave/")).await?;
        parse_leave_check(body)
    }

    async fn cancel_leave(&self, leave_id: u64, date: NaiveDate) -> Result<()> {
        tracing::info!("Cancelling leave {} for {}", leave_id, date);
        let payload = json!({ "date": date.format("%Y-%m-%d").to_string(), "leave_id": leave_id });
        self.send(self.request(Method::POST, "/leaves/cancel-leave-for-date/").json(&payload))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileApi for HttpBackend {
    async fn enrolled_descriptor(&self, user_id: &str) -> Result<Option<String>> {
        tracing::debug!("Fetching profile for {}", user_id);
        let body = self.send(self.request(Method::GET, "/auth/profile/")).await?;
        Ok(parse_profile_descriptor(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_field_is_verbatim() {
        let body = json!({ "error": "You are not within office premises" });
        assert_eq!(extract_error(&body, StatusCode::BAD_REQUEST), "You are not within office premises");
    }

    #[test]
    fn falls_back_to_field_errors_then_status() {
        let body = json!({ "latitude": ["This field is required."] });
        assert_eq!(
            extract_error(&body, StatusCode::BAD_REQUEST),
            "latitude: This field is required."
        );
        assert_eq!(
            extract_error(&Value::Null, StatusCode::BAD_GATEWAY),
            "Request failed with status 502"
        );
    }

    #[test]
    fn leave_check_parsing() {
        let none = json!({ "has_leave": false, "message": "No approved leave for today" });
        assert!(parse_leave_check(none).unwrap().is_none());

        let some = json!({
            "has_leave": true,
            "leave_id": 42,
            "leave_type": "Casual Leave",
            "start_date": "2026-10-17",
            "end_date": "2026-10-19",
            "message": "You have approved Casual Leave from 2026-10-17 to 2026-10-19"
        });
        let conflict = parse_leave_check(some).unwrap().unwrap();
        assert_eq!(conflict.leave_id, 42);
        assert_eq!(conflict.end_date, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());

        assert!(parse_leave_check(json!({ "has_leave": true })).is_err());
    }

    #[test]
    fn profile_descriptor_forms() {
        assert_eq!(
            parse_profile_descriptor(&json!({ "face_descriptor": "[0.1, 0.2]" })).as_deref(),
            Some("[0.1, 0.2]")
        );
        assert_eq!(
            parse_profile_descriptor(&json!({ "face_descriptor": [0.5, 0.25] })).as_deref(),
            Some("[0.5,0.25]")
        );
        assert!(parse_profile_descriptor(&json!({ "face_descriptor": "" })).is_none());
        assert!(parse_profile_descriptor(&json!({ "face_descriptor": null })).is_none());
    }

    #[test]
    fn urls_join_cleanly() {
        let backend = HttpBackend::new(&ApiConfig {
            base_url: "http://hr.local/api/".to_string(),
            ..ApiConfig::default()
        })
        .unwrap();
        assert_eq!(backend.url("/attendance/today/"), "http://hr.local/api/attendance/today/");
    }

    #[test]
    fn submission_body_shape() {
        let submission = PunchSubmission {
            direction: Direction::In,
            latitude: 12.5,
            longitude: 77.25,
            face_verified: true,
        };
        let body = serde_json::to_value(submission).unwrap();
        assert_eq!(body, json!({ "latitude": 12.5, "longitude": 77.25, "face_verified": true }));
    }
}
