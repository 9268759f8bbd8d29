//! Input Validation
//!
//! Request bodies arrive as untyped JSON. They are decoded field by field
//! into the loose `*Create` shapes below (every field optional so that a
//! missing or mistyped field is reported like any other violation), checked
//! with `validator`, and only then turned into the strongly-typed
//! [`NewFlame`] / [`NewReply`].
//!
//! A failure lists every violated field. Nothing is ever partially applied.

use chrono::{DateTime, NaiveDateTime, Utc};
use flame_payments::Tier;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::fmt;
use validator::{Validate, ValidationError, ValidationErrors};

pub const DEFAULT_FLAME_COLOR: &str = "#FF4D4D";

/// Accepted photo extensions, matched case-insensitively on the URL path
pub const PHOTO_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Named flame colors accepted besides hex values
pub const NAMED_COLORS: [&str; 4] = ["red", "pink", "gold", "purple"];

/// One violated field
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub code: String,
    pub message: String,
}

/// Every violation found in one request body
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub fields: Vec<FieldViolation>,
}

impl ValidationFailure {
    fn body(message: impl Into<String>) -> Self {
        Self {
            fields: vec![FieldViolation {
                field: "body".into(),
                code: "invalid_body".into(),
                message: message.into(),
            }],
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fields.as_slice() {
            [only] => write!(f, "{}: {}", only.field, only.message),
            many => write!(f, "{} fields invalid", many.len()),
        }
    }
}

impl From<ValidationErrors> for ValidationFailure {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<FieldViolation> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| FieldViolation {
                    field: field.to_string(),
                    code: e.code.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map_or_else(|| e.code.to_string(), ToString::to_string),
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field).then_with(|| a.code.cmp(&b.code)));

        Self { fields }
    }
}

/// Photo reference as sent by clients: a bare URL or `{ "url": ... }`
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PhotoInput {
    Url(String),
    Object { url: String },
}

impl PhotoInput {
    pub fn url(&self) -> &str {
        match self {
            Self::Url(url) | Self::Object { url } => url,
        }
    }
}

/// Flame creation body before validation
#[derive(Debug, Default, Validate)]
pub struct FlameCreate {
    #[validate(
        required(message = "recipient_name is required"),
        length(max = 80, message = "recipient_name must be at most 80 characters"),
        custom(function = "validate_not_blank")
    )]
    pub recipient_name: Option<String>,

    #[validate(
        required(message = "sender_name is required"),
        length(max = 80, message = "sender_name must be at most 80 characters"),
        custom(function = "validate_not_blank")
    )]
    pub sender_name: Option<String>,

    #[validate(
        required(message = "message is required"),
        length(min = 10, max = 4000, message = "message must be 10-4000 characters")
    )]
    pub message: Option<String>,

    #[validate(
        length(max = 3, message = "at most 3 photos allowed"),
        custom(function = "validate_photos")
    )]
    pub photos: Option<Vec<PhotoInput>>,

    #[validate(custom(function = "validate_flame_color"))]
    pub flame_color: Option<String>,

    #[validate(custom(function = "validate_tier"))]
    pub tier: Option<String>,

    #[validate(custom(function = "validate_schedule_date"))]
    pub schedule_date: Option<String>,

    pub allow_public_gallery: bool,
}

/// Validated flame content, ready to be persisted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewFlame {
    pub recipient_name: String,
    pub sender_name: String,
    pub message: String,
    pub photos: Vec<String>,
    pub flame_color: String,
    pub tier: Tier,
    pub schedule_date: Option<DateTime<Utc>>,
    pub allow_public_gallery: bool,
}

impl NewFlame {
    /// Decode and validate an untyped creation body.
    ///
    /// Unknown keys (including any client-sent `payment_status`) are
    /// ignored.
    pub fn parse(body: Value) -> Result<Self, ValidationFailure> {
        let mut fields = FieldReader::new(body)?;
        let input = FlameCreate {
            recipient_name: fields.take("recipient_name", "a string"),
            sender_name: fields.take("sender_name", "a string"),
            message: fields.take("message", "a string"),
            photos: fields.take("photos", "a list of URLs or {\"url\": ...} objects"),
            flame_color: fields.take("flame_color", "a string"),
            tier: fields.take("tier", "a string"),
            schedule_date: fields.take("schedule_date", "a string"),
            allow_public_gallery: fields
                .take("allow_public_gallery", "a boolean")
                .unwrap_or_default(),
        };
        fields.finish(input.validate())?;

        // Every Option below was checked by `required` / the custom rules.
        let tier = match input.tier.as_deref() {
            Some(tier) => tier.parse::<Tier>().unwrap_or_default(),
            None => Tier::default(),
        };
        let schedule_date = match input.schedule_date.as_deref() {
            Some(raw) => parse_timestamp(raw),
            None => None,
        };

        Ok(Self {
            recipient_name: input.recipient_name.unwrap_or_default().trim().to_string(),
            sender_name: input.sender_name.unwrap_or_default().trim().to_string(),
            message: input.message.unwrap_or_default(),
            photos: input
                .photos
                .unwrap_or_default()
                .iter()
                .map(|p| p.url().trim().to_string())
                .collect(),
            flame_color: input
                .flame_color
                .map_or_else(|| DEFAULT_FLAME_COLOR.to_string(), |c| c.trim().to_string()),
            tier,
            schedule_date,
            allow_public_gallery: input.allow_public_gallery,
        })
    }
}

/// Reply body before validation
#[derive(Debug, Default, Validate)]
pub struct ReplyCreate {
    #[validate(
        required(message = "message is required"),
        length(min = 3, max = 2000, message = "message must be 3-2000 characters")
    )]
    pub message: Option<String>,

    #[validate(length(max = 100, message = "sender_name must be at most 100 characters"))]
    pub sender_name: Option<String>,
}

/// Validated reply content
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewReply {
    pub message: String,
    pub sender_name: Option<String>,
}

impl NewReply {
    pub fn parse(body: Value) -> Result<Self, ValidationFailure> {
        let mut fields = FieldReader::new(body)?;
        let input = ReplyCreate {
            message: fields.take("message", "a string"),
            sender_name: fields.take("sender_name", "a string"),
        };
        fields.finish(input.validate())?;

        Ok(Self {
            message: input.message.unwrap_or_default(),
            sender_name: input
                .sender_name
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }
}

/// Field-by-field decoding of a JSON object body.
///
/// A field that fails to decode is recorded as a `type` violation and
/// treated as absent; rule violations on that field are then suppressed.
struct FieldReader {
    object: Map<String, Value>,
    mistyped: Vec<FieldViolation>,
}

impl FieldReader {
    fn new(body: Value) -> Result<Self, ValidationFailure> {
        match body {
            Value::Object(object) => Ok(Self {
                object,
                mistyped: Vec::new(),
            }),
            _ => Err(ValidationFailure::body("body must be a JSON object")),
        }
    }

    /// `null` counts as absent
    fn take<T: DeserializeOwned>(&mut self, field: &str, expected: &str) -> Option<T> {
        match self.object.remove(field) {
            None | Some(Value::Null) => None,
            Some(value) => serde_json::from_value(value)
                .inspect_err(|_| {
                    self.mistyped.push(FieldViolation {
                        field: field.to_string(),
                        code: "type".into(),
                        message: format!("{field} must be {expected}"),
                    });
                })
                .ok(),
        }
    }

    fn finish(self, rules: Result<(), ValidationErrors>) -> Result<(), ValidationFailure> {
        let mut fields = self.mistyped;
        if let Err(errors) = rules {
            let rule_violations: Vec<FieldViolation> = ValidationFailure::from(errors)
                .fields
                .into_iter()
                .filter(|v| !fields.iter().any(|t| t.field == v.field))
                .collect();
            fields.extend(rule_violations);
        }

        if fields.is_empty() {
            return Ok(());
        }
        fields.sort_by(|a, b| a.field.cmp(&b.field).then_with(|| a.code.cmp(&b.code)));
        Err(ValidationFailure { fields })
    }
}

fn violation(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(violation("blank", "must not be blank"));
    }
    Ok(())
}

fn validate_photos(photos: &[PhotoInput]) -> Result<(), ValidationError> {
    if photos.iter().all(|p| is_allowed_photo_url(p.url())) {
        Ok(())
    } else {
        Err(violation(
            "photo_url",
            "photos must be http(s) URLs ending in .jpg, .jpeg, .png, .gif or .webp",
        ))
    }
}

/// Well-formed http(s) URL whose path ends in an allow-listed image extension
pub fn is_allowed_photo_url(raw: &str) -> bool {
    let Ok(parsed) = url::Url::parse(raw.trim()) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return false;
    }

    let path = parsed.path().to_ascii_lowercase();
    PHOTO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn validate_flame_color(value: &str) -> Result<(), ValidationError> {
    if is_valid_color(value.trim()) {
        Ok(())
    } else {
        Err(violation(
            "flame_color",
            "flame_color must be a hex color or one of red, pink, gold, purple",
        ))
    }
}

fn is_valid_color(value: &str) -> bool {
    if NAMED_COLORS.contains(&value.to_ascii_lowercase().as_str()) {
        return true;
    }
    value.strip_prefix('#').is_some_and(|hex| {
        matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
    })
}

fn validate_tier(value: &str) -> Result<(), ValidationError> {
    value
        .parse::<Tier>()
        .map(|_| ())
        .map_err(|_| violation("tier", "tier must be basic or premium"))
}

fn validate_schedule_date(value: &str) -> Result<(), ValidationError> {
    if parse_timestamp(value).is_some() {
        Ok(())
    } else {
        Err(violation("schedule_date", "schedule_date must be an ISO 8601 timestamp"))
    }
}

/// Parse an RFC 3339 timestamp. A timestamp without offset is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
