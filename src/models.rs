//! Request/response contracts shared by the API client and the punch workflow.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Authentication

#[derive(Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

// Punch

/// A single geolocation reading in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationFix {
    /// Build a fix, rejecting non-finite or out-of-range coordinates
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self { latitude, longitude })
    }

    pub fn is_valid(&self) -> bool {
        Self::new(self.latitude, self.longitude).is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PunchType {
    In,
    Out,
}

/// JSON punch body, for callers that have no photo
#[derive(Debug, Clone, Serialize)]
pub struct PunchRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub punch_type: Option<PunchType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_location_id: Option<i64>,
}

/// Fields of the multipart punch upload
#[derive(Debug, Clone)]
pub struct PhotoPunch {
    pub fix: LocationFix,
    pub work_location_id: Option<i64>,
    /// JPEG bytes of the face photo
    pub photo: Vec<u8>,
}

/// Server verdict for a punch; `punch_type` and `timestamp` are kept as sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PunchResult {
    pub ok: bool,
    pub within_geofence: bool,
    pub distance_m: f64,
    #[serde(rename = "type")]
    pub punch_type: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_location: Option<WorkLocation>,
}

impl PunchResult {
    pub fn summary(&self) -> String {
        let verdict = if self.within_geofence {
            "within geofence"
        } else {
            "outside geofence"
        };
        format!(
            "{} at {}, {} m ({})",
            self.punch_type, self.timestamp, self.distance_m, verdict
        )
    }
}

// Profile

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkLocation {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub id: i64,
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub break_minutes: Option<i64>,
    #[serde(default)]
    pub late_grace_min: Option<i64>,
    #[serde(default)]
    pub early_grace_min: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub shift: Option<Shift>,
    #[serde(default)]
    pub allowed_locations: Vec<WorkLocation>,
    pub is_active: bool,
}

impl Profile {
    /// Punch target used when the caller does not pick one
    pub fn default_work_location(&self) -> Option<&WorkLocation> {
        self.allowed_locations.first()
    }

    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if full.is_empty() {
            self.username.clone()
        } else {
            full
        }
    }
}

/// Partial profile update; unset fields are left untouched by the server
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
    }
}

// Password

#[derive(Serialize)]
pub(crate) struct ChangePasswordRequest<'a> {
    pub new_password1: &'a str,
    pub new_password2: &'a str,
}

/// One validation message; `field` is `None` for form-level errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordChange {
    Changed,
    Rejected(Vec<FieldError>),
}

impl PasswordChange {
    /// Interpret a 400 body: `{"ok": false, "message": ..}` or a field map
    pub(crate) fn from_rejection(body: &str) -> Self {
        let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body)
        else {
            return Self::Rejected(vec![FieldError {
                field: None,
                message: body.to_string(),
            }]);
        };

        let mut errors = Vec::new();
        for (key, value) in map {
            let field = match key.as_str() {
                "ok" => continue,
                "message" | "detail" | "non_field_errors" => None,
                _ => Some(key),
            };
            match value {
                serde_json::Value::String(message) => errors.push(FieldError { field, message }),
                serde_json::Value::Array(items) => {
                    errors.extend(items.into_iter().map(|item| FieldError {
                        field: field.clone(),
                        message: match item {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        },
                    }))
                }
                other => errors.push(FieldError {
                    field,
                    message: other.to_string(),
                }),
            }
        }
        Self::Rejected(errors)
    }
}

// History

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Day,
    Week,
    Month,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
        }
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            other => Err(format!("unknown period: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub punch_type: String,
    pub timestamp: String,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_m: f64,
    pub within_geofence: bool,
    #[serde(default)]
    pub work_location: Option<WorkLocation>,
    #[serde(default)]
    pub employee_username: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryDay {
    pub date: NaiveDate,
    pub items: Vec<AttendanceRecord>,
    pub total_hours: f64,
    pub late: bool,
    pub early_leave: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub period: Period,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<HistoryDay>,
    pub sum_hours: f64,
}

impl History {
    /// Sum of the per-day totals; matches `sum_hours` up to per-day rounding
    pub fn days_total(&self) -> f64 {
        self.days.iter().map(|d| d.total_hours).sum()
    }
}
