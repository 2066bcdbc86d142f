use serde::{Deserialize, Serialize};

use super::super::domain::{CriterionId, MilestoneId, ScenarioDefinition};

/// Court's ruling on a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Classification {
    Sustained,
    Overruled,
    Inconclusive,
    /// Scenario-specific ruling declared in the scenario's `verdict_tags`.
    Tag(String),
}

impl Classification {
    pub fn label(&self) -> &str {
        match self {
            Classification::Sustained => "Sustained",
            Classification::Overruled => "Overruled",
            Classification::Inconclusive => "Inconclusive",
            Classification::Tag(tag) => tag,
        }
    }

    /// Recognise a classification, accepting the scenario's custom tags.
    fn recognise(raw: &str, scenario: &ScenarioDefinition) -> Option<Self> {
        let normalized = normalize(raw);
        match normalized.as_str() {
            "" => None,
            "sustained" => Some(Self::Sustained),
            "overruled" => Some(Self::Overruled),
            "inconclusive" => Some(Self::Inconclusive),
            _ => scenario
                .verdict_tags
                .iter()
                .find(|tag| normalize(tag) == normalized)
                .map(|tag| Self::Tag(tag.clone())),
        }
    }
}

impl From<String> for Classification {
    fn from(value: String) -> Self {
        match normalize(&value).as_str() {
            "sustained" => Self::Sustained,
            "overruled" => Self::Overruled,
            "inconclusive" => Self::Inconclusive,
            _ => Self::Tag(value),
        }
    }
}

impl From<Classification> for String {
    fn from(value: Classification) -> Self {
        value.label().to_string()
    }
}

/// Fully specified outcome of interpreting one adjudication response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub classification: Classification,
    pub matched_criteria: Vec<CriterionId>,
    /// Coverage of the matched criteria, in `[0, 1]`.
    pub confidence: f64,
    pub rationale: String,
    /// Furthest milestone the court considers reached, if any.
    pub milestone: Option<MilestoneId>,
}

/// Result of the extraction pass; never a partially populated verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedVerdict {
    Structured(Verdict),
    Unparseable { reason: String },
}

const DEFAULT_CONFIDENCE: f64 = 1.0;

/// Extract a verdict from free text.
///
/// Tries a JSON object first (Markdown fences are stripped), then `KEY: value` marker
/// lines. Only the classification is mandatory; a confidence that is present must
/// carry a number.
pub fn parse_verdict(raw: &str, scenario: &ScenarioDefinition) -> ParsedVerdict {
    let text = strip_code_fences(raw);
    if text.trim().is_empty() {
        return ParsedVerdict::Unparseable {
            reason: "empty response".to_string(),
        };
    }

    let fields = parse_json_fields(&text).unwrap_or_else(|| parse_marker_fields(&text));

    let Some(classification_raw) = fields.classification.as_deref() else {
        return ParsedVerdict::Unparseable {
            reason: "no classification marker found".to_string(),
        };
    };

    let Some(classification) = Classification::recognise(classification_raw, scenario) else {
        return ParsedVerdict::Unparseable {
            reason: format!("unrecognised classification '{}'", classification_raw.trim()),
        };
    };

    let mut matched_criteria: Vec<CriterionId> = Vec::new();
    for id in fields.criteria {
        let id = CriterionId::new(id);
        if !matched_criteria.contains(&id) {
            matched_criteria.push(id);
        }
    }

    let confidence = match fields.confidence.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_CONFIDENCE,
        Some(raw) => match parse_confidence(raw) {
            Some(value) => value,
            None => {
                return ParsedVerdict::Unparseable {
                    reason: format!("unreadable confidence '{raw}'"),
                }
            }
        },
    };

    let milestone = fields
        .milestone
        .map(|value| clean_token(&value))
        .filter(|value| !is_none_marker(value))
        .map(MilestoneId::new);

    ParsedVerdict::Structured(Verdict {
        classification,
        matched_criteria,
        confidence,
        rationale: fields.rationale.unwrap_or_default().trim().to_string(),
        milestone,
    })
}

#[derive(Debug, Default)]
struct ExtractedFields {
    classification: Option<String>,
    criteria: Vec<String>,
    confidence: Option<String>,
    rationale: Option<String>,
    milestone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonVerdict {
    #[serde(default, alias = "verdict", alias = "ruling")]
    classification: Option<String>,
    #[serde(default, alias = "criteria", alias = "matchedCriteria")]
    matched_criteria: Option<Vec<String>>,
    #[serde(default)]
    confidence: Option<serde_json::Value>,
    #[serde(default, alias = "reasoning")]
    rationale: Option<String>,
    #[serde(default)]
    milestone: Option<String>,
}

fn parse_json_fields(text: &str) -> Option<ExtractedFields> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    let parsed: JsonVerdict = serde_json::from_str(&text[start..=end]).ok()?;
    let confidence = parsed.confidence.and_then(|value| match value {
        serde_json::Value::Number(number) => Some(number.to_string()),
        serde_json::Value::String(text) => Some(text),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    });

    Some(ExtractedFields {
        classification: parsed.classification,
        criteria: parsed
            .matched_criteria
            .unwrap_or_default()
            .iter()
            .map(|id| clean_token(id))
            .filter(|id| !is_none_marker(id))
            .collect(),
        confidence,
        rationale: parsed.rationale,
        milestone: parsed.milestone,
    })
}

fn parse_marker_fields(text: &str) -> ExtractedFields {
    let mut fields = ExtractedFields::default();
    let mut in_rationale = false;

    for line in text.lines() {
        let cleaned = line
            .trim()
            .trim_start_matches(['-', '*', '#', '>'])
            .replace("**", "")
            .replace("__", "");
        let cleaned = cleaned.trim();

        let marker = cleaned
            .split_once(':')
            .and_then(|(key, value)| marker_key(key).map(|key| (key, value.trim())));

        match marker {
            Some((Marker::Classification, value)) => {
                in_rationale = false;
                if fields.classification.is_none() {
                    fields.classification = Some(value.to_string());
                }
            }
            Some((Marker::Criteria, value)) => {
                in_rationale = false;
                fields.criteria.extend(
                    value
                        .split([',', ';'])
                        .map(clean_token)
                        .filter(|id| !is_none_marker(id)),
                );
            }
            Some((Marker::Confidence, value)) => {
                in_rationale = false;
                fields.confidence = Some(value.to_string());
            }
            Some((Marker::Milestone, value)) => {
                in_rationale = false;
                fields.milestone = Some(value.to_string());
            }
            Some((Marker::Rationale, value)) => {
                in_rationale = true;
                fields.rationale = Some(value.to_string());
            }
            None if in_rationale => {
                if let Some(rationale) = fields.rationale.as_mut() {
                    if !cleaned.is_empty() {
                        if !rationale.is_empty() {
                            rationale.push(' ');
                        }
                        rationale.push_str(cleaned);
                    }
                }
            }
            None => {}
        }
    }

    fields
}

#[derive(Debug, Clone, Copy)]
enum Marker {
    Classification,
    Criteria,
    Confidence,
    Rationale,
    Milestone,
}

fn marker_key(key: &str) -> Option<Marker> {
    match normalize(key).as_str() {
        "classification" | "verdict" | "ruling" => Some(Marker::Classification),
        "criteria" | "matchedcriteria" | "rubriccriteria" => Some(Marker::Criteria),
        "confidence" | "coverage" => Some(Marker::Confidence),
        "rationale" | "reasoning" => Some(Marker::Rationale),
        "milestone" => Some(Marker::Milestone),
        _ => None,
    }
}

/// Reads the first number in `raw`, so `0.3 (low)` and `80 percent` both resolve.
fn parse_confidence(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let digit = trimmed.find(|ch: char| ch.is_ascii_digit())?;

    let mut start = digit;
    if trimmed[..start].ends_with('.') {
        start -= 1;
    }
    if trimmed[..start].ends_with('-') {
        start -= 1;
    }
    let end = trimmed[digit..]
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .map_or(trimmed.len(), |offset| digit + offset);

    let value: f64 = trimmed[start..end].trim_end_matches('.').parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    let unit = trimmed[end..].trim_start().to_ascii_lowercase();
    let percent = unit.starts_with('%') || unit.starts_with("percent") || unit.starts_with("per cent");
    let value = if percent || value > 1.0 {
        value / 100.0
    } else {
        value
    };
    Some(value.clamp(0.0, 1.0))
}

fn strip_code_fences(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean_token(raw: &str) -> String {
    raw.trim()
        .trim_matches(|ch: char| ch == '"' || ch == '\'' || ch == '`' || ch == '.')
        .trim()
        .to_string()
}

fn is_none_marker(value: &str) -> bool {
    matches!(
        normalize(value).as_str(),
        "" | "none" | "null" | "na" | "nil"
    )
}

fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|ch| ch.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
