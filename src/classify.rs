//! Best-effort heuristic classification of failures.
//!
//! The classifier lower-cases an error's message and name (and optionally its
//! stack) and walks an ordered table of [`CategoryRule`]s. The first rule whose
//! keyword, code or status matches wins. The default table checks network
//! indicators before database, validation, authentication, authorization and
//! system indicators, so a "connection refused" raised by a database driver is
//! reported as [`ErrorCategory::Network`].
//!
//! False classifications are expected; what is guaranteed is determinism: the
//! same message, name, code and status always yield the same category.
//!
//! # Examples
//!
//! ```
//! use handler_rail::classify::{CategoryRule, ClassificationRules, Classifier};
//! use handler_rail::{ErrorCategory, RouteError};
//!
//! let classifier = Classifier::default();
//! let err = RouteError::new("socket timeout").with_code("ETIMEDOUT");
//! assert_eq!(classifier.categorize(&err), ErrorCategory::Network);
//! assert!(classifier.is_retryable(&err));
//!
//! // Extend the table: quota errors are business-logic failures here.
//! let rules = ClassificationRules::default()
//!     .prepend(CategoryRule::new(ErrorCategory::BusinessLogic).keywords(["quota"]));
//! let classifier = Classifier::with_rules(rules);
//! let err = RouteError::new("quota exceeded");
//! assert_eq!(classifier.categorize(&err), ErrorCategory::BusinessLogic);
//! ```

use std::borrow::Cow;
use std::sync::LazyLock;

use crate::types::{ErrorCategory, RouteError};

/// Keywords that make a database failure worth retrying.
const TRANSIENT_DATABASE_KEYWORDS: &[&str] =
    &["timeout", "timed out", "connection", "temporar", "deadlock", "try again"];

/// Driver and errno codes for transient database conditions.
const TRANSIENT_DATABASE_CODES: &[&str] = &[
    "ETIMEDOUT",
    "ECONNRESET",
    "ECONNREFUSED",
    "EPIPE",
    "40001",
    "40P01",
    "53300",
    "57P01",
    "57P03",
    "ER_LOCK_DEADLOCK",
    "ER_LOCK_WAIT_TIMEOUT",
    "ER_CON_COUNT_ERROR",
];

static DEFAULT_CLASSIFIER: LazyLock<Classifier> = LazyLock::new(Classifier::default);

/// Shared classifier with the default rule table.
pub fn default_classifier() -> &'static Classifier {
    &DEFAULT_CLASSIFIER
}

/// One row of the classification table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    category: ErrorCategory,
    keywords: Vec<Cow<'static, str>>,
    codes: Vec<Cow<'static, str>>,
    statuses: Vec<u16>,
}

impl CategoryRule {
    pub fn new(category: ErrorCategory) -> Self {
        Self { category, keywords: Vec::new(), codes: Vec::new(), statuses: Vec::new() }
    }

    /// Adds lower-case substrings searched in message, name and stack.
    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        self.keywords
            .extend(keywords.into_iter().map(|k| Cow::Owned(k.into().to_lowercase())));
        self
    }

    /// Adds codes compared case-insensitively against [`RouteError::code`].
    pub fn codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        self.codes.extend(codes.into_iter().map(Into::into));
        self
    }

    /// Adds explicit HTTP statuses that imply this category.
    pub fn statuses<I>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.statuses.extend(statuses);
        self
    }

    #[inline]
    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    fn matches(&self, haystack: &str, code: Option<&str>, status: Option<u16>) -> bool {
        self.keywords.iter().any(|keyword| haystack.contains(keyword.as_ref()))
            || code.is_some_and(|code| self.codes.iter().any(|c| c.eq_ignore_ascii_case(code)))
            || status.is_some_and(|status| self.statuses.contains(&status))
    }
}

/// Ordered classification table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRules {
    rules: Vec<CategoryRule>,
    os_codes_as_system: bool,
}

impl ClassificationRules {
    /// An empty table; everything classifies as unknown unless a rule is added.
    pub fn empty() -> Self {
        Self { rules: Vec::new(), os_codes_as_system: false }
    }

    /// Inserts a rule ahead of all existing rules.
    pub fn prepend(mut self, rule: CategoryRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    /// Appends a rule after all existing rules.
    pub fn append(mut self, rule: CategoryRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Whether an unmatched errno-style code (`E` + upper-case letters/digits)
    /// falls back to [`ErrorCategory::System`].
    pub fn os_codes_as_system(mut self, enabled: bool) -> Self {
        self.os_codes_as_system = enabled;
        self
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }
}

impl Default for ClassificationRules {
    fn default() -> Self {
        let network = CategoryRule::new(ErrorCategory::Network)
            .keywords([
                "timeout",
                "timed out",
                "econnrefused",
                "econnreset",
                "enotfound",
                "etimedout",
                "network",
                "connect",
                "socket",
                "getaddrinfo",
                "unreachable",
            ])
            .codes([
                "ECONNREFUSED",
                "ECONNRESET",
                "ECONNABORTED",
                "ETIMEDOUT",
                "ENOTFOUND",
                "ENOTCONN",
                "EAI_AGAIN",
                "EHOSTUNREACH",
                "ENETUNREACH",
                "EPIPE",
            ]);
        let database = CategoryRule::new(ErrorCategory::Database)
            .keywords([
                "database",
                "sql",
                "query",
                "postgres",
                "mysql",
                "sqlite",
                "mongo",
                "redis",
                "deadlock",
                "duplicate key",
                "constraint",
                "transaction",
            ])
            .codes(["ER_LOCK_DEADLOCK", "ER_LOCK_WAIT_TIMEOUT", "ER_DUP_ENTRY", "ER_CON_COUNT_ERROR"]);
        let validation = CategoryRule::new(ErrorCategory::Validation)
            .keywords(["validation", "invalid", "required", "must be", "malformed", "schema"])
            .statuses([400, 422]);
        let authentication = CategoryRule::new(ErrorCategory::Authentication)
            .keywords(["unauthorized", "unauthenticated", "authentication", "token expired", "jwt"])
            .statuses([401]);
        let authorization = CategoryRule::new(ErrorCategory::Authorization)
            .keywords(["forbidden", "access denied", "not allowed", "insufficient permission"])
            .statuses([403]);
        let system = CategoryRule::new(ErrorCategory::System)
            .keywords(["enoent", "eacces", "emfile", "enospc", "eperm", "out of memory"])
            .codes(["ENOENT", "EACCES", "EMFILE", "ENOSPC", "EPERM", "ENOMEM", "EEXIST", "EISDIR"]);

        Self {
            rules: vec![network, database, validation, authentication, authorization, system],
            os_codes_as_system: true,
        }
    }
}

/// Heuristic categorizer and retryability oracle.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: ClassificationRules,
    inspect_stack: bool,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: ClassificationRules) -> Self {
        Self { rules, inspect_stack: false }
    }

    /// Also search the error's stack text for keywords.
    pub fn inspect_stack(mut self, enabled: bool) -> Self {
        self.inspect_stack = enabled;
        self
    }

    pub fn rules(&self) -> &ClassificationRules {
        &self.rules
    }

    /// Heuristic category, ignoring any category pinned on the error.
    pub fn categorize(&self, error: &RouteError) -> ErrorCategory {
        let haystack = self.haystack(error);
        let code = error.code();
        let status = error.status().map(|s| s.as_u16());

        if let Some(rule) =
            self.rules.rules.iter().find(|rule| rule.matches(&haystack, code, status))
        {
            return rule.category;
        }

        if self.rules.os_codes_as_system && code.is_some_and(is_os_style_code) {
            return ErrorCategory::System;
        }

        ErrorCategory::Unknown
    }

    /// Category pinned on the error, else the heuristic one.
    pub fn classify(&self, error: &RouteError) -> ErrorCategory {
        error.category().unwrap_or_else(|| self.categorize(error))
    }

    /// Whether retrying the failed operation could plausibly succeed.
    pub fn is_retryable(&self, error: &RouteError) -> bool {
        self.is_retryable_as(error, self.classify(error))
    }

    /// Retryability for an error whose category is already known.
    pub fn is_retryable_as(&self, error: &RouteError, category: ErrorCategory) -> bool {
        match category {
            ErrorCategory::Network => true,
            ErrorCategory::Database => {
                let message = error.message().to_lowercase();
                TRANSIENT_DATABASE_KEYWORDS.iter().any(|keyword| message.contains(keyword))
                    || error.code().is_some_and(|code| {
                        TRANSIENT_DATABASE_CODES.iter().any(|c| c.eq_ignore_ascii_case(code))
                    })
            },
            ErrorCategory::System
            | ErrorCategory::Validation
            | ErrorCategory::Authentication
            | ErrorCategory::Authorization => false,
            ErrorCategory::BusinessLogic | ErrorCategory::Unknown => {
                error.status().is_some_and(|status| status.is_server_error())
            },
        }
    }

    fn haystack(&self, error: &RouteError) -> String {
        let mut haystack = String::with_capacity(error.message().len() + error.name().len() + 1);
        haystack.push_str(&error.message().to_lowercase());
        haystack.push('\n');
        haystack.push_str(&error.name().to_lowercase());
        if self.inspect_stack {
            if let Some(stack) = error.stack() {
                haystack.push('\n');
                haystack.push_str(&stack.to_lowercase());
            }
        }
        haystack
    }
}

/// `E` followed by one or more upper-case letters or digits, e.g. `ENOENT`.
fn is_os_style_code(code: &str) -> bool {
    let mut chars = code.chars();
    chars.next() == Some('E')
        && code.len() > 1
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}
