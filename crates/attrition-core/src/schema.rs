//! Per-variant feature schemas.
//!
//! A [`FeatureSchema`] fixes, for one model variant, which raw input fields a
//! record must carry, the ordered feature names the classifier was trained
//! on, their display names, and the identifier fields that ride along with a
//! record without entering the feature vector.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The two independently trained classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Demographic,
    Survey,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Demographic, Variant::Survey];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Demographic => "demographic",
            Variant::Survey => "survey",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "demographic" | "employee" => Ok(Variant::Demographic),
            "survey" => Ok(Variant::Survey),
            _ => Err(format!(
                "Unknown model variant: {}. Expected one of: demographic, survey",
                s
            )),
        }
    }
}

/// Survey questions in the order the survey classifier was trained on.
pub const SURVEY_FEATURES: [&str; 19] = [
    "Work-Life Balance",
    "Job Satisfaction",
    "Relationship with Manager",
    "Communication effectiveness",
    "Recognition and Reward Satisfaction",
    "Career growth and advancement opportunities",
    "Alignment with Company Values/Mission",
    "Perceived fairness",
    "Team cohesion and peer support",
    "Autonomy at work",
    "Overall engagement",
    "Training and skill development satisfaction",
    "Stress levels/work pressure",
    "Organizational change readiness",
    "Feedback frequency and usefulness",
    "Flexibility support",
    "Conflict at work",
    "Perceived job security",
    "Environment satisfaction",
];

/// Inclusive bounds of a Likert answer.
pub const LIKERT_RANGE: (f64, f64) = (1.0, 5.0);

/// Sentinel used for identifiers a record does not carry.
pub const UNKNOWN_ID: &str = "Unknown";

const ENCODING_PREFIXES: [&str; 2] = ["num__", "cat__"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Numeric {
        #[serde(skip_serializing_if = "Option::is_none")]
        range: Option<(f64, f64)>,
    },
    Categorical {
        categories: Vec<String>,
    },
}

/// One raw input field a record must carry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputField {
    pub name: String,
    pub kind: FieldKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl InputField {
    pub fn numeric(name: impl Into<String>, range: Option<(f64, f64)>) -> Self {
        Self::with_kind(name.into(), FieldKind::Numeric { range })
    }

    pub fn categorical(name: impl Into<String>, categories: Vec<String>) -> Self {
        Self::with_kind(name.into(), FieldKind::Categorical { categories })
    }

    fn with_kind(name: String, kind: FieldKind) -> Self {
        let alias = field_alias(&name);
        let aliases = if alias != name { vec![alias] } else { Vec::new() };
        Self { name, kind, aliases }
    }

    pub fn matches(&self, key: &str) -> bool {
        self.name == key || self.aliases.iter().any(|a| a == key)
    }
}

/// An optional identifier carried alongside a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifierField {
    pub name: String,
    pub aliases: Vec<String>,
}

impl IdentifierField {
    fn new(name: &str, extra: &[&str]) -> Self {
        let mut aliases: Vec<String> = extra.iter().map(|s| s.to_string()).collect();
        let alias = field_alias(name);
        if alias != name && !aliases.contains(&alias) {
            aliases.push(alias);
        }
        Self {
            name: name.to_string(),
            aliases,
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        self.name == key || self.aliases.iter().any(|a| a == key)
    }
}

/// The identifier fields shared by both variants.
pub fn default_identifier_fields() -> Vec<IdentifierField> {
    vec![
        IdentifierField::new("Employee ID", &["EmployeeID", "employee_id"]),
        IdentifierField::new("Full Name", &["FullName", "full_name"]),
    ]
}

/// Where a record key lands after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSlot {
    Feature(usize),
    Identifier(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSchema {
    pub variant: Variant,
    /// Raw input fields, one per feature column, in feature order.
    pub input_fields: Vec<InputField>,
    pub ordered_feature_names: Vec<String>,
    /// Index-aligned with `ordered_feature_names`.
    pub display_names: Vec<String>,
    pub id_fields: Vec<IdentifierField>,
}

impl FeatureSchema {
    /// Schema for the demographic variant, derived from the column encoder:
    /// numeric columns first, then categorical columns.
    pub fn demographic(numeric: &[String], categorical: &[(String, Vec<String>)]) -> Self {
        let mut input_fields = Vec::with_capacity(numeric.len() + categorical.len());
        let mut ordered_feature_names = Vec::with_capacity(input_fields.capacity());

        for name in numeric {
            input_fields.push(InputField::numeric(name.clone(), None));
            ordered_feature_names.push(format!("num__{}", name));
        }
        for (name, categories) in categorical {
            input_fields.push(InputField::categorical(name.clone(), categories.clone()));
            ordered_feature_names.push(format!("cat__{}", name));
        }

        let display_names = ordered_feature_names.iter().map(|n| display_name(n)).collect();
        Self {
            variant: Variant::Demographic,
            input_fields,
            ordered_feature_names,
            display_names,
            id_fields: default_identifier_fields(),
        }
    }

    /// Schema for the survey variant. Question texts double as display names.
    pub fn survey() -> Self {
        let input_fields = SURVEY_FEATURES
            .iter()
            .map(|q| InputField::numeric(*q, Some(LIKERT_RANGE)))
            .collect();
        let names: Vec<String> = SURVEY_FEATURES.iter().map(|q| q.to_string()).collect();
        Self {
            variant: Variant::Survey,
            input_fields,
            ordered_feature_names: names.clone(),
            display_names: names,
            id_fields: default_identifier_fields(),
        }
    }

    pub fn n_features(&self) -> usize {
        self.ordered_feature_names.len()
    }

    /// Resolve a record key (canonical name or alias) to its slot.
    pub fn resolve_field(&self, key: &str) -> Option<FieldSlot> {
        if let Some(idx) = self.input_fields.iter().position(|f| f.matches(key)) {
            return Some(FieldSlot::Feature(idx));
        }
        self.id_fields
            .iter()
            .position(|f| f.matches(key))
            .map(FieldSlot::Identifier)
    }

    /// Look up a feature column by its encoded name, display name, or raw
    /// input field name.
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.ordered_feature_names
            .iter()
            .position(|n| n == name)
            .or_else(|| self.display_names.iter().position(|n| n == name))
            .or_else(|| self.input_fields.iter().position(|f| f.matches(name)))
    }
}

/// Underscore alias for a field name: runs of non-alphanumerics become `_`.
pub fn field_alias(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending = false;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending && !out.is_empty() {
                out.push('_');
            }
            pending = false;
            out.push(ch);
        } else {
            pending = true;
        }
    }
    out
}

/// Human-readable name for an encoded feature name.
///
/// Strips the encoder prefixes, turns underscores into spaces and
/// capitalises each word (first letter upper, remainder lower).
pub fn display_name(feature_name: &str) -> String {
    let mut name = feature_name.to_string();
    for prefix in ENCODING_PREFIXES {
        name = name.replace(prefix, "");
    }
    name.replace('_', " ")
        .split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}
