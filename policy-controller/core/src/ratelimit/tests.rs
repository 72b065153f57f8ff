use super::*;
use crate::{
    routes::{HeaderMatch, HttpRouteMatch, Method, PathMatch},
    tests::{mk_limit, mk_match, mk_rule},
};

#[test]
fn converts_rates() {
    let counter = |limit, duration, unit| {
        let limit = mk_limit(limit, duration, unit);
        (limit.rates[0].max_value(), limit.rates[0].seconds())
    };

    assert_eq!(counter(5, 2, "hour"), (5, 7200));
    assert_eq!(counter(-5, 2, "second"), (0, 2));
    assert_eq!(counter(5, -2, "second"), (5, 0));
    assert_eq!(counter(5, 0, "minute"), (5, 0));
    assert_eq!(counter(5, 2, "unknown"), (5, 0));
    assert_eq!(counter(1, 3, "day"), (1, 3 * 86400));
    assert_eq!(counter(1, i64::MAX, "day"), (1, u64::MAX));
}

#[test]
fn identifiers_are_stable() {
    let policy = ObjectKey::new("ns-0", "rlp-0");
    assert_eq!(identifier(&policy, "toys"), identifier(&policy, "toys"));
    assert!(identifier(&policy, "toys").starts_with("limit_toys__"));
}

#[test]
fn identifiers_do_not_collide() {
    let a = ObjectKey::new("ns-0", "rlp-0");
    let b = ObjectKey::new("ns-0", "rlp-1");
    assert_ne!(identifier(&a, "x"), identifier(&b, "x"));

    // Both names sanitize to `limit_a_b`.
    let (x, y) = (identifier(&a, "a-b"), identifier(&a, "a.b"));
    assert!(x.starts_with("limit_a_b__"));
    assert!(y.starts_with("limit_a_b__"));
    assert_ne!(x, y);
}

#[test]
fn identifiers_are_sanitized() {
    let id = identifier(&ObjectKey::new("ns-0", "rlp-0"), "per user/min!");
    let (name, digest) = id.rsplit_once("__").unwrap();
    assert_eq!(name, "limit_per_user_min_");
    assert_eq!(digest.len(), 8);
    assert!(digest.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
}

#[test]
fn conditions_from_route_matches() {
    let rule = mk_rule("rule-1", vec![mk_match(Method::GET, "/toy")]);
    assert_eq!(
        conditions(&rule, &[]),
        vec![Condition {
            all_of: vec![
                PatternExpression::new("request.url_path", Operator::StartsWith, "/toy"),
                PatternExpression::new("request.method", Operator::Eq, "GET"),
            ],
        }]
    );
}

#[test]
fn conditions_append_predicates_to_every_alternative() {
    let when = vec![PatternExpression::new(
        "auth.identity.group",
        Operator::Neq,
        "admin",
    )];
    let rule = mk_rule(
        "rule-1",
        vec![
            HttpRouteMatch {
                path: Some(PathMatch::Exact("/cars".to_string())),
                headers: vec![
                    HeaderMatch::Exact("X-Tier".to_string(), "free".to_string()),
                    HeaderMatch::regex("x-client", "^mobile-.*$").unwrap(),
                ],
                method: None,
            },
            HttpRouteMatch {
                path: Some(PathMatch::regex("^/bikes/[0-9]+$").unwrap()),
                ..HttpRouteMatch::default()
            },
        ],
    );

    assert_eq!(
        conditions(&rule, &when),
        vec![
            Condition {
                all_of: vec![
                    PatternExpression::new("request.url_path", Operator::Eq, "/cars"),
                    PatternExpression::new("request.headers.x-tier", Operator::Eq, "free"),
                    PatternExpression::new("request.headers.x-client", Operator::Matches, "^mobile-.*$"),
                    when[0].clone(),
                ],
            },
            Condition {
                all_of: vec![
                    PatternExpression::new("request.url_path", Operator::Matches, "^/bikes/[0-9]+$"),
                    when[0].clone(),
                ],
            },
        ]
    );
}

#[test]
fn unset_paths_match_everything() {
    let rule = mk_rule(
        "rule-1",
        vec![HttpRouteMatch {
            method: Some(Method::DELETE),
            ..HttpRouteMatch::default()
        }],
    );
    assert_eq!(
        conditions(&rule, &[]),
        vec![Condition {
            all_of: vec![
                PatternExpression::new("request.url_path", Operator::StartsWith, "/"),
                PatternExpression::new("request.method", Operator::Eq, "DELETE"),
            ],
        }]
    );
}

#[test]
fn catch_all_rules() {
    let rule = mk_rule("rule-1", vec![]);
    assert!(conditions(&rule, &[]).is_empty());

    let when = vec![PatternExpression::new("source.ip", Operator::Neq, "10.0.0.1")];
    assert_eq!(
        conditions(&rule, &when),
        vec![Condition {
            all_of: when.clone()
        }]
    );
}

#[test]
fn data_marks_limit_and_counters() {
    let limit = Limit {
        counters: vec![
            "auth.identity.username".to_string(),
            "auth.identity.groups.0".to_string(),
        ],
        ..mk_limit(1, 1, "second")
    };
    assert_eq!(
        data("limit_x__00112233", &limit),
        vec![
            DataItem::Static {
                key: "limit_x__00112233".to_string(),
                value: "1".to_string(),
            },
            DataItem::Selector {
                selector: "auth.identity.username".to_string(),
                key: Some("auth.identity.username".to_string()),
                default: None,
            },
            DataItem::Selector {
                selector: "auth.identity.groups[0]".to_string(),
                key: Some("auth.identity.groups.0".to_string()),
                default: None,
            },
        ]
    );
}

#[test]
fn selector_references() {
    assert_eq!(selector_reference("request.host"), "request.host");
    assert_eq!(selector_reference("a.0.b.12"), "a[0].b[12]");
    assert_eq!(
        selector_reference(r"metadata.filter_metadata.envoy\.filters\.http\.ext_authz.identity"),
        r#"metadata.filter_metadata["envoy.filters.http.ext_authz"].identity"#
    );
    assert_eq!(selector_reference("0"), "0");
}

#[test]
fn descriptor_references_are_quoted() {
    assert_eq!(
        descriptor_reference("auth.identity.username"),
        r#"descriptors[0]["auth.identity.username"]"#
    );
    assert_eq!(descriptor_reference(r#"a"b"#), r#"descriptors[0]["a\"b"]"#);
    assert_eq!(descriptor_reference(r"a\b"), r#"descriptors[0]["a\\b"]"#);
    assert_eq!(descriptor_reference(r#"a\""#), r#"descriptors[0]["a\\\""]"#);
}

#[test]
fn one_counter_per_rate() {
    let limit = Limit {
        rates: vec![
            Rate {
                limit: 10,
                duration: 1,
                unit: RateUnit::Second,
            },
            Rate {
                limit: 100,
                duration: 1,
                unit: RateUnit::Minute,
            },
        ],
        counters: vec![r#"request.headers.x-"quoted""#.to_string()],
        when: vec![],
    };

    let defs = counter_definitions("ns-0/gw-0#ns-0/rlp-0", "limit_x__00112233", &limit);
    assert_eq!(defs.len(), 2);
    for def in &defs {
        assert_eq!(def.namespace, "ns-0/gw-0#ns-0/rlp-0");
        assert_eq!(
            def.conditions,
            vec![r#"descriptors[0]["limit_x__00112233"] == "1""#.to_string()]
        );
        assert_eq!(
            def.variables,
            vec![r#"descriptors[0]["request.headers.x-\"quoted\""]"#.to_string()]
        );
    }
    assert_eq!((defs[0].max_value, defs[0].seconds), (10, 1));
    assert_eq!((defs[1].max_value, defs[1].seconds), (100, 60));
}
