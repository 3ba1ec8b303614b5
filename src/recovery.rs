//! Static recovery checklists keyed on [`ErrorCategory`].

use crate::types::{EnhancedError, ErrorCategory, Suggestions};

const BACKOFF_HINT: &str = "Retry the operation with exponential backoff";

const FALLBACK: &[&str] = &[
    "Check the application logs using the correlation id",
    "Contact support if the problem persists",
];

fn checklist(category: ErrorCategory) -> &'static [&'static str] {
    match category {
        ErrorCategory::Network => &[
            "Check network connectivity",
            "Verify the remote endpoint address and port",
            "Inspect firewall and DNS configuration",
        ],
        ErrorCategory::Database => &[
            "Check the database connection and credentials",
            "Verify the query and the referenced tables",
            "Confirm the database server is reachable and not overloaded",
        ],
        ErrorCategory::Validation => &[
            "Review the request payload against the expected schema",
            "Ensure all required fields are present and well-formed",
        ],
        ErrorCategory::Authentication => &[
            "Verify the supplied credentials or token",
            "Check whether the session or token has expired",
        ],
        ErrorCategory::Authorization => &[
            "Confirm the caller has the required permissions",
            "Review role and access-control configuration",
        ],
        ErrorCategory::System => &[
            "Check file paths and permissions",
            "Verify available disk space and memory",
            "Inspect process resource limits",
        ],
        ErrorCategory::BusinessLogic => &[
            "Review the business rules applied to this operation",
            "Check the current state of the resources involved",
        ],
        ErrorCategory::Unknown => FALLBACK,
    }
}

/// Returns the checklist for the error's category.
///
/// Retryable errors get a trailing backoff hint.
pub fn suggest(error: &EnhancedError) -> Suggestions {
    suggest_for(error.category(), error.is_retryable())
}

/// Same as [`suggest`] for a bare category/retryability pair.
pub fn suggest_for(category: ErrorCategory, retryable: bool) -> Suggestions {
    let mut suggestions: Suggestions =
        checklist(category).iter().map(|item| (*item).to_owned()).collect();
    if retryable {
        suggestions.push(BACKOFF_HINT.to_owned());
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_gets_backoff_hint_when_retryable() {
        let suggestions = suggest_for(ErrorCategory::Network, true);
        assert_eq!(suggestions[0], "Check network connectivity");
        assert_eq!(suggestions.last().map(String::as_str), Some(BACKOFF_HINT));
    }

    #[test]
    fn unknown_falls_back_to_two_items() {
        let suggestions = suggest_for(ErrorCategory::Unknown, false);
        assert_eq!(suggestions.len(), 2);
    }

    #[test]
    fn every_category_has_suggestions() {
        for category in ErrorCategory::ALL {
            assert!(!suggest_for(category, false).is_empty(), "{category}");
        }
    }
}
