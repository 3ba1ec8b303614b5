use core::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Coarse classification assigned to every failure that passes through the rail.
///
/// All variants except [`ErrorCategory::BusinessLogic`] can be produced by the
/// heuristic [`Classifier`](crate::classify::Classifier). `BusinessLogic` is
/// reserved for callers who tag their own errors with
/// [`RouteError::with_category`](crate::types::RouteError::with_category).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Database,
    Network,
    Validation,
    Authentication,
    Authorization,
    System,
    BusinessLogic,
    Unknown,
}

impl ErrorCategory {
    /// Every category, in classification priority order followed by the
    /// categories the heuristic never assigns.
    pub const ALL: [ErrorCategory; 8] = [
        ErrorCategory::Network,
        ErrorCategory::Database,
        ErrorCategory::Validation,
        ErrorCategory::Authentication,
        ErrorCategory::Authorization,
        ErrorCategory::System,
        ErrorCategory::BusinessLogic,
        ErrorCategory::Unknown,
    ];

    /// Wire name used in JSON envelopes and log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Network => "network",
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::System => "system",
            Self::BusinessLogic => "business_logic",
            Self::Unknown => "unknown",
        }
    }

    /// HTTP status used when the failure does not carry an explicit one.
    pub const fn default_status(self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::Network => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database | Self::System | Self::BusinessLogic | Self::Unknown => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::BusinessLogic).unwrap();
        assert_eq!(json, "\"business_logic\"");
        assert_eq!(ErrorCategory::BusinessLogic.as_str(), "business_logic");
    }

    #[test]
    fn default_status_follows_category() {
        assert_eq!(ErrorCategory::Validation.default_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCategory::Authentication.default_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCategory::Authorization.default_status(), StatusCode::FORBIDDEN);
        assert!(ErrorCategory::Database.default_status().is_server_error());
        assert!(ErrorCategory::Network.default_status().is_server_error());
        assert!(ErrorCategory::System.default_status().is_server_error());
        assert_eq!(ErrorCategory::Unknown.default_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
