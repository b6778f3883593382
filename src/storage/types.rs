use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Biographical record used to personalize prompts
///
/// Read-only to the gateway; the profile service owns writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProfile {
    /// Profile identifier
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Gender as entered by the user
    #[serde(default)]
    pub gender: String,
    /// Birth place, compact form (province + city + district)
    #[serde(default)]
    pub location: String,
    /// Street-level detail of the birth place
    #[serde(default)]
    pub location_detail: String,
    /// Solar (Gregorian) birth time, `YYYY-MM-DD HH:MM`
    #[serde(default)]
    pub solar: String,
    /// Lunar birth time as text
    #[serde(default)]
    pub lunar: String,
    /// True solar time of birth
    #[serde(default)]
    pub true_solar: String,
    /// Birth place longitude
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Birth place latitude
    #[serde(default)]
    pub latitude: Option<f64>,
}

/// One generated draw for a subject on a calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyDraw {
    /// Profile the draw belongs to
    #[serde(skip_serializing)]
    #[serde(default)]
    pub subject_id: String,
    /// Calendar day of the draw
    pub date: NaiveDate,
    /// Name of the drawn card
    pub card_name: String,
    /// Three to five short keywords
    pub keywords: Vec<String>,
    /// Interpretation text
    pub interpretation: String,
    /// Advice text
    pub advice: String,
}
