use crate::{
    routes::{HttpRouteMatch, Method, PathMatch},
    *,
};
use maplit::btreemap;
use std::collections::BTreeMap;

pub(crate) const NS: &str = "ns-0";
pub(crate) const CLASS: &str = "gateway-class-0";

pub(crate) fn mk_gateway(name: &str, listeners: &[(&str, Option<&str>)]) -> Gateway {
    Gateway {
        key: ObjectKey::new(NS, name),
        class_name: CLASS.to_string(),
        ready: true,
        listeners: listeners
            .iter()
            .map(|(name, hostname)| Listener {
                name: name.to_string(),
                hostname: hostname.map(str::to_string),
            })
            .collect(),
    }
}

pub(crate) fn mk_route(name: &str, gateways: &[&str], rules: Vec<RouteRule>) -> Route {
    Route {
        key: ObjectKey::new(NS, name),
        hostnames: vec![],
        parents: gateways
            .iter()
            .map(|gw| ParentRef {
                gateway: ObjectKey::new(NS, gw),
                section_name: None,
                accepted: true,
            })
            .collect(),
        rules,
    }
}

pub(crate) fn mk_rule(name: &str, matches: Vec<HttpRouteMatch>) -> RouteRule {
    RouteRule {
        name: name.to_string(),
        matches,
    }
}

pub(crate) fn mk_match(method: Method, prefix: &str) -> HttpRouteMatch {
    HttpRouteMatch {
        path: Some(PathMatch::Prefix(prefix.to_string())),
        headers: vec![],
        method: Some(method),
    }
}

pub(crate) fn mk_limit(limit: i64, duration: i64, unit: &str) -> Limit {
    Limit {
        rates: vec![Rate {
            limit,
            duration,
            unit: RateUnit::from(unit),
        }],
        ..Limit::default()
    }
}

pub(crate) fn mk_policy(
    name: &str,
    target: TargetRef,
    strategy: MergeStrategy,
    rules: BTreeMap<String, Limit>,
) -> Policy {
    Policy::RateLimit(PolicySpec {
        key: ObjectKey::new(NS, name),
        target_refs: vec![target],
        strategy,
        when: vec![],
        rules,
    })
}

/// A gateway with one permissive listener and a route with a single `POST /orders` rule.
fn orders_topology(policies: Vec<Policy>) -> Topology {
    Topology::build(
        vec![mk_gateway("gw-0", &[("http", None)])],
        vec![mk_route(
            "route-0",
            &["gw-0"],
            vec![mk_rule("rule-1", vec![mk_match(Method::POST, "/orders")])],
        )],
        policies,
    )
}

#[test]
fn compiles_route_policy() {
    let _tracing = tracing_subscriber::fmt().with_test_writer().try_init();

    let policy = mk_policy(
        "rlp-0",
        TargetRef::http_route("route-0"),
        MergeStrategy::Defaults(Strategy::Atomic),
        btreemap! { "5rps".to_string() => mk_limit(5, 1, "second") },
    );
    let topology = orders_topology(vec![policy]);
    let compiled = compile(&Config::default(), &topology);

    let gateway = ObjectKey::new(NS, "gw-0");
    let policy = ObjectKey::new(NS, "rlp-0");
    let id = ratelimit::identifier(&policy, "5rps");
    assert!(id.starts_with("limit_5rps__"));

    let scope = LimitScope::new(&gateway, policy.to_string());
    assert_eq!(scope.to_string(), "ns-0/gw-0#ns-0/rlp-0");
    assert_eq!(
        compiled.limits.flatten(),
        vec![CounterDefinition {
            namespace: scope.to_string(),
            max_value: 5,
            seconds: 1,
            conditions: vec![format!("descriptors[0][\"{id}\"] == \"1\"")],
            variables: vec![],
        }]
    );

    assert_eq!(compiled.filters.len(), 1);
    let filter = &compiled.filters[&gateway];
    assert!(filter.failure_mode_deny);
    assert_eq!(
        filter.policies,
        vec![FilterPolicy {
            name: policy.to_string(),
            domain: scope.to_string(),
            service: Config::DEFAULT_SERVICE.to_string(),
            hostnames: vec!["*".to_string()],
            rules: vec![CompiledRule {
                conditions: vec![Condition {
                    all_of: vec![
                        PatternExpression::new("request.url_path", Operator::StartsWith, "/orders"),
                        PatternExpression::new("request.method", Operator::Eq, "POST"),
                    ],
                }],
                data: vec![DataItem::Static {
                    key: id,
                    value: "1".to_string(),
                }],
            }],
        }]
    );
}

#[test]
fn route_defaults_replace_gateway_defaults() {
    let gateway_default = mk_policy(
        "rlp-gw",
        TargetRef::gateway("gw-0"),
        MergeStrategy::Defaults(Strategy::Atomic),
        btreemap! { "r".to_string() => mk_limit(1, 1, "second") },
    );
    let topology = orders_topology(vec![gateway_default.clone()]);
    let compiled = compile(&Config::default(), &topology);
    let defs = compiled.limits.flatten();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].max_value, 1);
    assert_eq!(defs[0].namespace, "ns-0/gw-0#ns-0/rlp-gw");

    let route_default = mk_policy(
        "rlp-route",
        TargetRef::http_route("route-0"),
        MergeStrategy::Defaults(Strategy::Atomic),
        btreemap! { "r".to_string() => mk_limit(2, 1, "second") },
    );
    let topology = orders_topology(vec![gateway_default, route_default]);
    let compiled = compile(&Config::default(), &topology);
    let defs = compiled.limits.flatten();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].max_value, 2);
    assert_eq!(defs[0].namespace, "ns-0/gw-0#ns-0/rlp-route");
}

#[test]
fn gateway_overrides_win_regardless_of_order() {
    let gateway_override = mk_policy(
        "rlp-gw",
        TargetRef::gateway("gw-0"),
        MergeStrategy::Overrides(Strategy::Atomic),
        btreemap! { "r".to_string() => mk_limit(1, 1, "second") },
    );
    let route_default = mk_policy(
        "rlp-route",
        TargetRef::http_route("route-0"),
        MergeStrategy::Defaults(Strategy::Atomic),
        btreemap! { "r".to_string() => mk_limit(2, 1, "second") },
    );

    for policies in [
        vec![gateway_override.clone(), route_default.clone()],
        vec![route_default, gateway_override],
    ] {
        let compiled = compile(&Config::default(), &orders_topology(policies));
        let defs = compiled.limits.flatten();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].max_value, 1);
        assert_eq!(
            compiled.effective.contributors().into_iter().collect::<Vec<_>>(),
            vec![ObjectKey::new(NS, "rlp-gw")]
        );
    }
}

#[test]
fn empty_policies_compile_to_nothing() {
    let policy = mk_policy(
        "rlp-0",
        TargetRef::http_route("route-0"),
        MergeStrategy::default(),
        BTreeMap::new(),
    );
    let compiled = compile(&Config::default(), &orders_topology(vec![policy]));
    assert!(compiled.limits.is_empty());
    assert!(compiled.filters.is_empty());
    assert!(compiled.effective.iter().all(|(_, rules)| rules.is_empty()));
}

#[test]
fn limits_without_rates_are_skipped() {
    let policy = mk_policy(
        "rlp-0",
        TargetRef::http_route("route-0"),
        MergeStrategy::default(),
        btreemap! { "none".to_string() => Limit::default() },
    );
    let compiled = compile(&Config::default(), &orders_topology(vec![policy]));
    assert!(compiled.limits.is_empty());
    assert!(compiled.filters.is_empty());
}

#[test]
fn compilation_is_deterministic() {
    let gateways = vec![
        mk_gateway("gw-0", &[("http", None), ("https", Some("*.example.com"))]),
        mk_gateway("gw-1", &[("http", None)]),
    ];
    let mut route_1 = mk_route(
        "route-1",
        &["gw-0", "gw-1"],
        vec![
            mk_rule("rule-1", vec![mk_match(Method::GET, "/toy")]),
            mk_rule("rule-2", vec![]),
        ],
    );
    route_1.hostnames = vec!["api.example.com".to_string()];
    let routes = vec![
        mk_route(
            "route-0",
            &["gw-0"],
            vec![mk_rule("rule-1", vec![mk_match(Method::POST, "/orders")])],
        ),
        route_1,
    ];
    let policies = vec![
        mk_policy(
            "rlp-0",
            TargetRef::gateway("gw-0"),
            MergeStrategy::Defaults(Strategy::Merge),
            btreemap! {
                "a".to_string() => mk_limit(10, 1, "minute"),
                "b".to_string() => mk_limit(100, 1, "hour"),
            },
        ),
        mk_policy(
            "rlp-1",
            TargetRef::http_route("route-1").with_section("rule-1"),
            MergeStrategy::Defaults(Strategy::Merge),
            btreemap! { "a".to_string() => mk_limit(5, 1, "minute") },
        ),
        mk_policy(
            "rlp-2",
            TargetRef::gateway("gw-1"),
            MergeStrategy::Overrides(Strategy::Atomic),
            btreemap! { "c".to_string() => mk_limit(1, 1, "second") },
        ),
    ];

    let forward = Topology::build(gateways.clone(), routes.clone(), policies.clone());
    let reversed = Topology::build(
        gateways.into_iter().rev(),
        routes.into_iter().rev(),
        policies.into_iter().rev(),
    );

    let config = Config::default();
    let a = compile(&config, &forward);
    let b = compile(&config, &forward);
    let c = compile(&config, &reversed);
    assert_eq!(a, b);
    assert_eq!(a, c);

    let json = |c: &Compiled| {
        c.filters
            .values()
            .map(|f| f.to_json().unwrap().to_string())
            .collect::<Vec<_>>()
    };
    assert_eq!(json(&a), json(&c));
    assert_eq!(a.limits.flatten(), c.limits.flatten());
}

#[test]
fn path_errors_name_the_broken_relationship() {
    let topology = Topology::default();
    let err = topology
        .validate_path(&[PathNode::Gateway(ObjectKey::new("ns-0", "gw-0"))])
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid path at index 0: gateway ns-0/gw-0 not found"
    );
}
