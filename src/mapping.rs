//! Submission -> payload field mapping.
//!
//! Static rules come first, in a fixed order, then the free-form custom rules
//! (`target|source` per line) where the last line for a target wins. Phone
//! targets are normalized on the way in.

use crate::errors::AppError;
use crate::models::{Payload, Submission};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r\n|\n|\r").expect("static regex"));

/// Rule keys of the fixed schema subset, in application order, with the
/// target field each one writes.
pub const STATIC_RULES: [(&str, &str); 8] = [
    ("contact_first_name", Payload::CONTACT_FIRST),
    ("contact_last_name", Payload::CONTACT_LAST),
    ("company_name", Payload::COMPANY_NAME),
    ("contact_email", Payload::CONTACT_EMAIL),
    ("contact_mobile", Payload::CONTACT_MOBILE),
    ("contact_phone", Payload::CONTACT_PHONE),
    ("job_address", Payload::JOB_ADDRESS),
    ("description", Payload::JOB_DESCRIPTION),
];

pub const PHONE_FIELDS: [&str; 2] = [Payload::CONTACT_MOBILE, Payload::CONTACT_PHONE];

/// Translates a rule key to its target field. Unknown keys are already
/// target names.
pub fn target_field(rule_key: &str) -> &str {
    STATIC_RULES
        .iter()
        .find(|(key, _)| *key == rule_key)
        .map(|(_, target)| *target)
        .unwrap_or(rule_key)
}

pub fn is_phone_field(target: &str) -> bool {
    PHONE_FIELDS.contains(&target)
}

/// Parses `left|right` lines into ordered, trimmed pairs.
///
/// Lines without a `|`, or with an empty side, are skipped. Only the first
/// `|` splits, so the right side may itself contain pipes.
pub fn parse_pipe_lines(text: &str) -> Vec<(String, String)> {
    LINE_BREAK
        .split(text)
        .filter_map(|line| {
            let (left, right) = line.split_once('|')?;
            let (left, right) = (left.trim(), right.trim());
            if left.is_empty() || right.is_empty() {
                tracing::debug!("Ignoring malformed mapping line: {:?}", line);
                return None;
            }
            Some((left.to_string(), right.to_string()))
        })
        .collect()
}

/// Keeps digits and a single leading `+`.
///
/// `"(04) 1234-5678"` -> `"0412345678"`, `"+61 4 1234 5678"` -> `"+61412345678"`.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let leading_plus = raw
        .chars()
        .find(|c| c.is_ascii_digit() || *c == '+')
        .is_some_and(|c| c == '+');

    if leading_plus {
        format!("+{}", digits)
    } else {
        digits
    }
}

/// Mapping rules parsed once per pipeline run.
#[derive(Debug, Clone, Default)]
pub struct MappingRules {
    /// (target field, source key) in application order.
    rules: Vec<(String, String)>,
}

impl MappingRules {
    pub fn new(static_rules: &BTreeMap<String, String>, custom_text: &str) -> Self {
        let mut rules = Vec::new();

        for (rule_key, target) in STATIC_RULES {
            if let Some(source) = static_rules.get(rule_key).filter(|s| !s.trim().is_empty()) {
                rules.push((target.to_string(), source.trim().to_string()));
            }
        }
        for (rule_key, source) in static_rules {
            let known = STATIC_RULES.iter().any(|(key, _)| key == rule_key);
            if !known && !source.trim().is_empty() {
                rules.push((rule_key.clone(), source.trim().to_string()));
            }
        }

        for (target, source) in parse_pipe_lines(custom_text) {
            rules.push((target_field(&target).to_string(), source));
        }

        Self { rules }
    }

    /// Applies the rules to a submission.
    ///
    /// Fails with a validation error, before anything touches the network,
    /// when neither a first name nor a company name ends up in the payload.
    pub fn apply(&self, submission: &Submission, default_status: &str) -> Result<Payload, AppError> {
        let mut payload = Payload::default();
        payload.set(Payload::STATUS, default_status);

        for (target, source) in &self.rules {
            let Some(value) = submission.text(source) else {
                continue;
            };
            let value = if is_phone_field(target) {
                normalize_phone(&value)
            } else {
                value
            };
            payload.set(target.clone(), value);
        }

        if payload.get(Payload::CONTACT_FIRST).is_none()
            && payload.get(Payload::COMPANY_NAME).is_none()
        {
            return Err(AppError::Validation(
                "Missing required field: first name or company name required".to_string(),
            ));
        }

        Ok(payload)
    }
}

/// One-shot convenience over [`MappingRules`].
pub fn build_payload(
    submission: &Submission,
    static_rules: &BTreeMap<String, String>,
    custom_text: &str,
    default_status: &str,
) -> Result<Payload, AppError> {
    MappingRules::new(static_rules, custom_text).apply(submission, default_status)
}
