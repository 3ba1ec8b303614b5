use handler_rail::{CategoryRule, ClassificationRules, Classifier, ErrorCategory, RouteError};
use http::StatusCode;

#[test]
fn default_rules_cover_taxonomy() {
    let classifier = Classifier::new();
    let cases = [
        ("socket hang up", ErrorCategory::Network),
        ("duplicate key value violates unique constraint", ErrorCategory::Database),
        ("email is required", ErrorCategory::Validation),
        ("jwt malformed signature", ErrorCategory::Validation),
        ("token expired", ErrorCategory::Authentication),
        ("Forbidden", ErrorCategory::Authorization),
        ("out of memory", ErrorCategory::System),
        ("User not found", ErrorCategory::Unknown),
    ];

    for (message, expected) in cases {
        assert_eq!(classifier.categorize(&RouteError::new(message)), expected, "{message}");
    }
}

#[test]
fn statuses_and_codes_classify_without_keywords() {
    let classifier = Classifier::new();
    let unauthorized = RouteError::new("nope").with_status(StatusCode::UNAUTHORIZED);
    let refused = RouteError::new("nope").with_code("econnrefused");
    let other_os = RouteError::new("nope").with_code("EBADF");

    assert_eq!(classifier.categorize(&unauthorized), ErrorCategory::Authentication);
    assert_eq!(classifier.categorize(&refused), ErrorCategory::Network);
    assert_eq!(classifier.categorize(&other_os), ErrorCategory::System);
}

#[test]
fn os_code_fallback_can_be_disabled() {
    let classifier = Classifier::with_rules(ClassificationRules::default().os_codes_as_system(false));
    let err = RouteError::new("nope").with_code("EBADF");
    assert_eq!(classifier.categorize(&err), ErrorCategory::Unknown);
}

#[test]
fn prepended_rules_take_priority() {
    let rules = ClassificationRules::default()
        .prepend(CategoryRule::new(ErrorCategory::BusinessLogic).keywords(["Quota"]));
    let classifier = Classifier::with_rules(rules);

    let err = RouteError::new("quota exceeded while connecting to billing");
    assert_eq!(classifier.categorize(&err), ErrorCategory::BusinessLogic);
    assert_eq!(Classifier::new().categorize(&err), ErrorCategory::Network);
}

#[test]
fn pinned_category_wins() {
    let err = RouteError::new("database offline").with_category(ErrorCategory::BusinessLogic);
    let classifier = Classifier::new();

    assert_eq!(classifier.categorize(&err), ErrorCategory::Database);
    assert_eq!(classifier.classify(&err), ErrorCategory::BusinessLogic);
}

#[test]
fn stack_is_only_searched_when_enabled() {
    let err = RouteError::new("failed").with_stack("at PgPool::query (db.rs:10)");

    assert_eq!(Classifier::new().categorize(&err), ErrorCategory::Unknown);
    assert_eq!(Classifier::new().inspect_stack(true).categorize(&err), ErrorCategory::Database);
}

#[test]
fn io_errors_carry_os_codes() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "cannot open upload dir");
    let err = RouteError::from(io);

    assert_eq!(err.code(), Some("EACCES"));
    assert_eq!(Classifier::new().categorize(&err), ErrorCategory::System);
}
