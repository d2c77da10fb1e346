//! Schema-driven random argument synthesis.
//!
//! [`ParameterSynthesizer`] produces argument objects that conform to a tool's
//! input schema. Values are chosen by, in order: an exact field override from
//! [`MockConfig::fields`], a field-name heuristic, a schema `enum`, and finally
//! the schema `type`.
//!
//! The name heuristics are substring matches and are checked in a fixed order,
//! so a field like `countryCode` gets a country name. Callers relying on
//! specific values should use `[mock.fields]` overrides.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use rand::distr::{Distribution, Uniform};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const FIRST_NAMES: &[&str] = &["Alice", "Bob", "Carol", "David", "Erin", "Frank", "Grace", "Heidi"];
const LAST_NAMES: &[&str] = &["Smith", "Jones", "Garcia", "Chen", "Okafor", "Novak", "Silva"];
const STREETS: &[&str] = &["Main St", "Oak Ave", "Maple Dr", "Cedar Ln", "Park Rd"];
const CITIES: &[&str] = &["Springfield", "Riverside", "Lisbon", "Osaka", "Toronto", "Nairobi"];
const COUNTRIES: &[&str] = &["United States", "Portugal", "Japan", "Canada", "Kenya", "Germany"];

/// Nesting limit for object/array recursion.
const MAX_DEPTH: usize = 8;

/// Knobs for generated values, read from the `[mock]` config table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Length of random strings.
    pub string_length: usize,
    /// Number of items in generated arrays.
    pub array_length: usize,
    /// Lower bound for generated numbers.
    pub number_min: f64,
    /// Upper bound for generated numbers.
    pub number_max: f64,
    /// Exact per-field values, matched by property name.
    pub fields: BTreeMap<String, Value>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            string_length: 8,
            array_length: 2,
            number_min: 0.0,
            number_max: 1000.0,
            fields: BTreeMap::new(),
        }
    }
}

/// Field-name heuristic, in match priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameHint {
    Email,
    Url,
    Name,
    Phone,
    Address,
    City,
    Country,
    Date,
}

impl NameHint {
    const ORDER: [(&'static str, NameHint); 8] = [
        ("email", NameHint::Email),
        ("url", NameHint::Url),
        ("name", NameHint::Name),
        ("phone", NameHint::Phone),
        ("address", NameHint::Address),
        ("city", NameHint::City),
        ("country", NameHint::Country),
        ("date", NameHint::Date),
    ];

    fn for_field(field: &str) -> Option<Self> {
        let lower = field.to_ascii_lowercase();
        Self::ORDER
            .iter()
            .find(|(needle, _)| lower.contains(needle))
            .map(|(_, hint)| *hint)
    }
}

/// Generates schema-conformant tool arguments.
#[derive(Debug, Clone, Default)]
pub struct ParameterSynthesizer {
    mock: MockConfig,
}

impl ParameterSynthesizer {
    /// Creates a synthesizer using the given mock settings.
    pub fn new(mock: MockConfig) -> Self {
        Self { mock }
    }

    /// Mock settings in effect.
    pub fn mock(&self) -> &MockConfig {
        &self.mock
    }

    /// Produces a value for every property declared in an object schema.
    pub fn generate(&self, schema: &Value) -> Map<String, Value> {
        self.generate_object(schema, 0)
    }

    /// Produces a value for one named field.
    pub fn generate_field(&self, name: &str, schema: &Value) -> Value {
        self.field_value(name, schema, 0)
    }

    fn generate_object(&self, schema: &Value, depth: usize) -> Map<String, Value> {
        let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
            return Map::new();
        };
        properties
            .iter()
            .map(|(name, prop)| (name.clone(), self.field_value(name, prop, depth)))
            .collect()
    }

    fn field_value(&self, name: &str, schema: &Value, depth: usize) -> Value {
        if let Some(value) = self.mock.fields.get(name) {
            return value.clone();
        }
        if let Some(hint) = NameHint::for_field(name) {
            return self.hinted_value(hint, schema);
        }
        self.schema_value(schema, depth)
    }

    fn schema_value(&self, schema: &Value, depth: usize) -> Value {
        if let Some(options) = schema.get("enum").and_then(Value::as_array) {
            if !options.is_empty() {
                return options[rand::rng().random_range(0..options.len())].clone();
            }
        }

        match schema_type(schema) {
            Some("string") => Value::String(self.random_string()),
            Some("number") => json!(self.random_number()),
            Some("integer") => json!(self.random_integer()),
            Some("boolean") => Value::Bool(rand::rng().random_bool(0.5)),
            Some("array") if depth < MAX_DEPTH => {
                let items = schema.get("items").cloned().unwrap_or_else(|| json!({"type": "string"}));
                Value::Array(
                    (0..self.mock.array_length)
                        .map(|_| self.schema_value(&items, depth + 1))
                        .collect(),
                )
            },
            Some("object") if depth < MAX_DEPTH => Value::Object(self.generate_object(schema, depth + 1)),
            Some("array") => Value::Array(Vec::new()),
            Some("object") => Value::Object(Map::new()),
            _ => Value::Null,
        }
    }

    fn hinted_value(&self, hint: NameHint, schema: &Value) -> Value {
        let mut rng = rand::rng();
        let text = match hint {
            NameHint::Email => format!("user{}@example.com", rng.random_range(1000..10000)),
            NameHint::Url => format!("https://example.com/{}", self.random_string().to_lowercase()),
            NameHint::Name => format!("{} {}", pick(FIRST_NAMES), pick(LAST_NAMES)),
            NameHint::Phone => format!(
                "+1-555-{:03}-{:04}",
                rng.random_range(0..1000),
                rng.random_range(0..10000)
            ),
            NameHint::Address => format!("{} {}", rng.random_range(1..10000), pick(STREETS)),
            NameHint::City => pick(CITIES).to_string(),
            NameHint::Country => pick(COUNTRIES).to_string(),
            NameHint::Date => {
                let when = Utc::now() - Duration::days(rng.random_range(0..3650));
                if schema.get("format").and_then(Value::as_str) == Some("date-time") {
                    when.to_rfc3339()
                } else {
                    when.format("%Y-%m-%d").to_string()
                }
            },
        };
        Value::String(text)
    }

    fn random_string(&self) -> String {
        let mut rng = rand::rng();
        (0..self.mock.string_length)
            .map(|_| char::from(ALPHANUMERIC[rng.random_range(0..ALPHANUMERIC.len())]))
            .collect()
    }

    fn bounds(&self) -> (f64, f64) {
        let (a, b) = (self.mock.number_min, self.mock.number_max);
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Uniform in the configured bounds. Bounds that cannot form a sampling
    /// range (non-finite, or a span that overflows) yield the lower bound.
    fn random_number(&self) -> f64 {
        let (lo, hi) = self.bounds();
        match Uniform::new_inclusive(lo, hi) {
            Ok(range) => range.sample(&mut rand::rng()),
            Err(_) => lo,
        }
    }

    fn random_integer(&self) -> i64 {
        let (lo, hi) = self.bounds();
        let (lo, hi) = (lo.ceil() as i64, hi.floor() as i64);
        if lo >= hi {
            return lo;
        }
        rand::rng().random_range(lo..=hi)
    }
}

/// The schema's `type`, taking the first non-null entry of a type array.
/// Schemas with `properties` but no `type` are treated as objects.
fn schema_type(schema: &Value) -> Option<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => Some(t.as_str()),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ if schema.get("properties").is_some() => Some("object"),
        _ => None,
    }
}

fn pick(options: &[&'static str]) -> &'static str {
    options[rand::rng().random_range(0..options.len())]
}
