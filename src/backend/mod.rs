pub mod http;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use crate::common::Result;
use crate::flow::punch::Direction;
use crate::location::Coordinates;

pub use http::HttpBackend;

/// Body of a punch-in/punch-out request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PunchSubmission {
    #[serde(skip)]
    pub direction: Direction,
    pub latitude: f64,
    pub longitude: f64,
    pub face_verified: bool,
}

impl PunchSubmission {
    pub fn new(direction: Direction, coordinates: Coordinates, face_verified: bool) -> Self {
        Self {
            direction,
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            face_verified,
        }
    }
}

/// Today's attendance record as the server reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TodayStatus {
    pub date: Option<NaiveDate>,
    pub punch_in: Option<String>,
    pub punch_out: Option<String>,
    pub status: Option<String>,
    pub is_wfh: bool,
    pub message: Option<String>,
}

impl TodayStatus {
    pub fn punched_in(&self) -> bool {
        self.punch_in.is_some()
    }

    pub fn punched_out(&self) -> bool {
        self.punch_out.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PunchAck {
    pub message: String,
    #[serde(rename = "data")]
    pub record: Option<TodayStatus>,
}

/// An approved leave overlapping today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveConflict {
    pub leave_id: u64,
    pub leave_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub message: String,
}

#[async_trait]
pub trait AttendanceApi: Send + Sync {
    /// Failures carry the server's message verbatim.
    async fn punch(&self, submission: &PunchSubmission) -> Result<PunchAck>;

    async fn today_status(&self) -> Result<TodayStatus>;
}

#[async_trait]
pub trait LeaveApi: Send + Sync {
    async fn today_leave_conflict(&self, user_id: &str) -> Result<Option<LeaveConflict>>;

    async fn cancel_leave(&self, leave_id: u64, date: NaiveDate) -> Result<()>;
}

#[async_trait]
pub trait ProfileApi: Send + Sync {
    /// The enrolled descriptor in its stored form, if the user has one.
    async fn enrolled_descriptor(&self, user_id: &str) -> Result<Option<String>>;
}
