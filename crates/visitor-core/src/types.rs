use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// One observed page visit.
///
/// Column names follow the ingestion table (`company_name`, `anon_id`, ...)
/// so a record read from storage exports back under the same headers.
/// Columns this engine does not interpret (contact fields and the like)
/// are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitEvent {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub company_domain: Option<String>,
    #[serde(default, rename = "location")]
    pub location_text: Option<String>,
    #[serde(default)]
    pub page_url: String,
    /// Timestamp exactly as delivered. See [`VisitEvent::instant`].
    #[serde(default, deserialize_with = "de_raw_timestamp")]
    pub timestamp: String,
    #[serde(default, serialize_with = "ser_duration")]
    pub duration_seconds: Option<f64>,
    #[serde(default, rename = "anon_id")]
    pub anon_visitor_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VisitEvent {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        company_name: impl Into<String>,
        page_url: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            company_name: Some(company_name.into()),
            company_domain: None,
            location_text: None,
            page_url: page_url.into(),
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_seconds: None,
            anon_visitor_id: None,
            extra: Map::new(),
        }
    }

    pub fn with_anon_id(mut self, anon_id: impl Into<String>) -> Self {
        self.anon_visitor_id = Some(anon_id.into());
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location_text = Some(location.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.company_domain = Some(domain.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// The parsed visit instant, or `None` when the raw timestamp is unreadable.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    /// Company name, empty when absent.
    pub fn company(&self) -> &str {
        self.company_name.as_deref().unwrap_or("")
    }

    /// Anonymous visitor id; an empty id counts as absent.
    pub fn visitor_id(&self) -> Option<&str> {
        self.anon_visitor_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Look up an uninterpreted string column such as `linkedin_url`.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// A named tag bound to a company. Owned by label management; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub company_name: String,
    #[serde(rename = "label")]
    pub label_text: String,
    #[serde(default, rename = "color")]
    pub display_color: String,
}

impl Label {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        company_name: impl Into<String>,
        label_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            company_name: company_name.into(),
            label_text: label_text.into(),
            display_color: String::new(),
        }
    }
}

/// Parse a delivered timestamp into an instant.
///
/// Accepts RFC 3339, the Postgres text form (`2024-05-01 10:00:00.123+00`),
/// offset-less date-times (read as UTC) and bare dates (UTC midnight).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Ids arrive as strings or as integer keys depending on the table.
fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Keep whatever the row carried; null becomes empty and never parses.
fn de_raw_timestamp<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Whole-second durations serialize as integers (`120`, not `120.0`).
fn ser_duration<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
            serializer.serialize_some(&(*v as i64))
        }
        Some(v) => serializer.serialize_some(v),
        None => serializer.serialize_none(),
    }
}
