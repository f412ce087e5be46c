//! Routing rule selection for submitted justifications.

use rust_decimal::Decimal;

use crate::domain::rule::{RoutingRule, WILDCARD};
use crate::errors::DomainError;

pub(crate) fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

fn matches_key(candidate: &str, value: &str) -> bool {
    let candidate = normalize_key(candidate);
    candidate == WILDCARD || candidate == normalize_key(value)
}

fn is_exact(candidate: &str) -> bool {
    normalize_key(candidate) != WILDCARD
}

/// Specificity rank: exact department and type beats exact department alone,
/// which beats exact type alone, which beats double wildcard.
fn specificity(rule: &RoutingRule) -> u8 {
    match (is_exact(&rule.department), is_exact(&rule.type_code)) {
        (true, true) => 3,
        (true, false) => 2,
        (false, true) => 1,
        (false, false) => 0,
    }
}

/// Select the single rule governing a justification's classification.
///
/// Candidates must match department and type (exact or wildcard) and have a
/// spend threshold at or below the cost estimate. Ties break on specificity,
/// then on the highest threshold (the most stringent rule applicable to this
/// spend level), then on rule name so selection is total and repeatable.
pub fn match_rule<'a>(
    rules: &'a [RoutingRule],
    department: &str,
    type_code: &str,
    cost_estimate: Decimal,
) -> Result<&'a RoutingRule, DomainError> {
    let mut candidates: Vec<&RoutingRule> = rules
        .iter()
        .filter(|rule| {
            matches_key(&rule.department, department)
                && matches_key(&rule.type_code, type_code)
                && rule.spend_threshold <= cost_estimate
        })
        .collect();

    if candidates.is_empty() {
        return Err(DomainError::NoRoutingRule {
            department: department.to_string(),
            type_code: type_code.to_string(),
        });
    }

    candidates.sort_by(|left, right| {
        specificity(right)
            .cmp(&specificity(left))
            .then_with(|| right.spend_threshold.cmp(&left.spend_threshold))
            .then_with(|| left.name.cmp(&right.name))
    });

    Ok(candidates[0])
}
