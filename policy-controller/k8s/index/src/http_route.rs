use anyhow::{anyhow, bail, Result};
use gateway_policy_controller_core::{
    policy::GATEWAY_API_GROUP,
    routes::{HeaderMatch, HttpRouteMatch, Method, PathMatch},
    ObjectKey, ParentRef, Route, RouteRule,
};
use gateway_policy_controller_k8s_api::gateway as api;

pub(crate) fn route(key: ObjectKey, route: api::HttpRoute) -> Result<Route> {
    let statuses = route
        .status
        .map(|status| status.inner.parents)
        .unwrap_or_default();

    let parents = route
        .spec
        .inner
        .parent_refs
        .into_iter()
        .flatten()
        .filter(is_gateway)
        .map(|parent_ref| {
            let accepted = statuses
                .iter()
                .any(|status| is_accepted(status, &parent_ref, &key.namespace));
            ParentRef {
                gateway: ObjectKey::new(
                    parent_ref.namespace.as_deref().unwrap_or(&key.namespace),
                    &parent_ref.name,
                ),
                section_name: parent_ref.section_name,
                accepted,
            }
        })
        .collect();

    let rules = route
        .spec
        .rules
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(i, rule)| -> Result<RouteRule> {
            let matches = rule
                .matches
                .into_iter()
                .flatten()
                .map(try_match)
                .collect::<Result<_>>()?;
            Ok(RouteRule {
                name: rule_name(i),
                matches,
            })
        })
        .collect::<Result<_>>()?;

    Ok(Route {
        key,
        hostnames: route.spec.hostnames.unwrap_or_default(),
        parents,
        rules,
    })
}

/// Route rules are addressed by their position, starting at 1.
pub(crate) fn rule_name(index: usize) -> String {
    format!("rule-{}", index + 1)
}

pub(crate) fn try_match(
    api::HttpRouteMatch {
        path,
        headers,
        query_params,
        method,
    }: api::HttpRouteMatch,
) -> Result<HttpRouteMatch> {
    // Limits are compiled to path, method and header predicates only; a rule that also matched on
    // query parameters would be limited more broadly than it routes.
    if query_params.as_ref().is_some_and(|q| !q.is_empty()) {
        bail!("query parameter matches are not supported");
    }

    let path = path.map(path_match).transpose()?;

    let headers = headers
        .into_iter()
        .flatten()
        .map(header_match)
        .collect::<Result<_>>()?;

    let method = method
        .as_deref()
        .map(Method::try_from)
        .transpose()
        .map_err(|error| anyhow!("invalid method: {error}"))?;

    Ok(HttpRouteMatch {
        path,
        headers,
        method,
    })
}

pub(crate) fn path_match(path_match: api::HttpPathMatch) -> Result<PathMatch> {
    match path_match {
        api::HttpPathMatch::Exact { value } | api::HttpPathMatch::PathPrefix { value }
            if !value.starts_with('/') =>
        {
            Err(anyhow!(
                "HttpPathMatch paths must be absolute (begin with `/`); {value:?} is not an absolute path"
            ))
        }
        api::HttpPathMatch::Exact { value } => Ok(PathMatch::Exact(value)),
        api::HttpPathMatch::PathPrefix { value } => Ok(PathMatch::Prefix(value)),
        api::HttpPathMatch::RegularExpression { value } => PathMatch::regex(&value),
    }
}

pub(crate) fn header_match(header_match: api::HttpHeaderMatch) -> Result<HeaderMatch> {
    match header_match {
        api::HttpHeaderMatch::Exact { name, value } => Ok(HeaderMatch::Exact(name, value)),
        api::HttpHeaderMatch::RegularExpression { name, value } => HeaderMatch::regex(name, &value),
    }
}

fn is_gateway(parent_ref: &api::ParentReference) -> bool {
    parent_ref.group.as_deref().unwrap_or(GATEWAY_API_GROUP) == GATEWAY_API_GROUP
        && parent_ref.kind.as_deref().unwrap_or("Gateway") == "Gateway"
}

/// A parent reference is accepted when the route's status reports `Accepted=True` for the same
/// gateway and section.
fn is_accepted(
    status: &api::RouteParentStatus,
    parent_ref: &api::ParentReference,
    route_ns: &str,
) -> bool {
    let status_ref = &status.parent_ref;
    let same_parent = is_gateway(status_ref)
        && status_ref.name == parent_ref.name
        && status_ref.namespace.as_deref().unwrap_or(route_ns)
            == parent_ref.namespace.as_deref().unwrap_or(route_ns)
        && status_ref.section_name == parent_ref.section_name;

    same_parent
        && status
            .conditions
            .iter()
            .any(|c| c.type_ == "Accepted" && c.status == "True")
}
