//! The attachment graph of gateways, routes and policies.
//!
//! Nodes are held in maps keyed by [`ObjectKey`] and linked by key, so the graph is a pure
//! function of the snapshots it's built from:
//!
//! ```text
//! [ GatewayClass ] <- [ Gateway ] -> [ Listener ] <- [ HTTPRoute ] -> [ Rule ]
//!                          ^              ^               ^              ^
//!                          +--------------+-- [ Policy ] -+--------------+
//! ```
//!
//! A route is linked to a gateway only through parent references that the gateway has accepted.
//! Gateways that are not programmed are left out of the graph entirely.

use crate::{
    policy::{Policy, PolicyKind},
    routes::{self, HttpRouteMatch},
    ObjectKey,
};
use ahash::AHashMap as HashMap;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, PartialEq)]
pub struct Gateway {
    pub key: ObjectKey,
    pub class_name: String,

    /// Whether the gateway is programmed. Unprogrammed gateways are ignored.
    pub ready: bool,

    pub listeners: Vec<Listener>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listener {
    pub name: String,

    /// When unset, the listener accepts any authority.
    pub hostname: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub key: ObjectKey,
    pub hostnames: Vec<String>,
    pub parents: Vec<ParentRef>,
    pub rules: Vec<RouteRule>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentRef {
    pub gateway: ObjectKey,
    pub section_name: Option<String>,
    pub accepted: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteRule {
    pub name: String,

    /// Alternatives; a rule without matches applies to every request on the route.
    pub matches: Vec<HttpRouteMatch>,
}

/// A point that policies attach to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeRef {
    Gateway(ObjectKey),
    Listener { gateway: ObjectKey, name: String },
    Route(ObjectKey),
    RouteRule { route: ObjectKey, name: String },
}

/// A route rule as reached from a gateway listener.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path {
    pub gateway: ObjectKey,
    pub listener: String,
    pub route: ObjectKey,
    pub rule: String,

    /// The authorities the rule serves through the listener. Empty means any.
    pub hostnames: Vec<String>,
}

/// An element of a request path to validate with [`Topology::validate_path`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathNode {
    GatewayClass(String),
    Gateway(ObjectKey),
    Listener(String),
    Route(ObjectKey),
    RouteRule(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid path at index {index}: {reason}")]
pub struct PathError {
    pub index: usize,
    pub reason: PathErrorReason,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PathErrorReason {
    #[error("path is empty")]
    Empty,

    #[error("{0} not found")]
    UnknownNode(String),

    #[error("node may not follow the previous node")]
    UnexpectedNode,

    #[error("gateway {gateway} does not belong to class {class}")]
    GatewayClassMismatch { class: String, gateway: ObjectKey },

    #[error("listener {listener} does not belong to gateway {gateway}")]
    ListenerNotInGateway { gateway: ObjectKey, listener: String },

    #[error("route {route} is not accepted by gateway {gateway}")]
    RouteNotAccepted { gateway: ObjectKey, route: ObjectKey },

    #[error("route {route} does not attach to listener {listener}")]
    SectionMismatch { route: ObjectKey, listener: String },

    #[error("hostnames of route {route} do not intersect listener {listener}")]
    HostnameMismatch { route: ObjectKey, listener: String },

    #[error("rule {rule} does not belong to route {route}")]
    RuleNotInRoute { route: ObjectKey, rule: String },
}

#[derive(Clone, Debug, Default)]
pub struct Topology {
    gateways: BTreeMap<ObjectKey, GatewayNode>,
    routes: BTreeMap<ObjectKey, RouteNode>,
    policies: BTreeMap<(PolicyKind, ObjectKey), Policy>,
    attachments: HashMap<NodeRef, BTreeSet<(PolicyKind, ObjectKey)>>,
    unattached: BTreeSet<(PolicyKind, ObjectKey)>,
}

#[derive(Clone, Debug)]
struct GatewayNode {
    gateway: Gateway,
    routes: BTreeSet<ObjectKey>,
}

#[derive(Clone, Debug)]
struct RouteNode {
    route: Route,
    gateways: BTreeSet<ObjectKey>,
}

// === impl Topology ===

impl Topology {
    pub fn build(
        gateways: impl IntoIterator<Item = Gateway>,
        routes: impl IntoIterator<Item = Route>,
        policies: impl IntoIterator<Item = Policy>,
    ) -> Self {
        let mut topology = Self::default();

        for gateway in gateways {
            if !gateway.ready {
                tracing::debug!(gateway = %gateway.key, "Skipping gateway that is not programmed");
                continue;
            }
            topology.gateways.insert(
                gateway.key.clone(),
                GatewayNode {
                    gateway,
                    routes: BTreeSet::new(),
                },
            );
        }

        for route in routes {
            let mut gateways = BTreeSet::new();
            for parent in route.parents.iter().filter(|p| p.accepted) {
                if let Some(gw) = topology.gateways.get_mut(&parent.gateway) {
                    gw.routes.insert(route.key.clone());
                    gateways.insert(parent.gateway.clone());
                }
            }
            topology
                .routes
                .insert(route.key.clone(), RouteNode { route, gateways });
        }

        for policy in policies {
            let id = (policy.kind(), policy.key().clone());
            let mut attached = false;
            for target in policy.target_refs() {
                match topology.resolve_target(&policy, target) {
                    Some(node) => {
                        tracing::trace!(policy = %id.1, kind = %id.0, ?node, "Attaching policy");
                        topology
                            .attachments
                            .entry(node)
                            .or_default()
                            .insert(id.clone());
                        attached = true;
                    }
                    None => {
                        tracing::debug!(policy = %id.1, kind = %id.0, target = %target.name, "Policy target not found");
                    }
                }
            }
            if !attached {
                topology.unattached.insert(id.clone());
            }
            topology.policies.insert(id, policy);
        }

        topology
    }

    pub fn gateway(&self, key: &ObjectKey) -> Option<&Gateway> {
        self.gateways.get(key).map(|n| &n.gateway)
    }

    pub fn route(&self, key: &ObjectKey) -> Option<&Route> {
        self.routes.get(key).map(|n| &n.route)
    }

    pub fn route_rule(&self, route: &ObjectKey, name: &str) -> Option<&RouteRule> {
        self.route(route)?.rules.iter().find(|r| r.name == name)
    }

    /// Gateways that have accepted the route.
    pub fn route_gateways(&self, route: &ObjectKey) -> impl Iterator<Item = &ObjectKey> {
        self.routes.get(route).into_iter().flat_map(|n| n.gateways.iter())
    }

    /// Routes attached to the gateway.
    pub fn gateway_routes(&self, gateway: &ObjectKey) -> impl Iterator<Item = &ObjectKey> {
        self.gateways
            .get(gateway)
            .into_iter()
            .flat_map(|n| n.routes.iter())
    }

    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    /// Policies of the given kind attached directly to the node, ordered by key.
    pub fn policies_at<'t>(
        &'t self,
        node: &NodeRef,
        kind: PolicyKind,
    ) -> impl Iterator<Item = &'t Policy> + 't {
        self.attachments
            .get(node)
            .into_iter()
            .flatten()
            .filter(move |(k, _)| *k == kind)
            .filter_map(|id| self.policies.get(id))
    }

    /// Policies whose targets are not in the graph.
    pub fn unattached(&self) -> impl Iterator<Item = &Policy> {
        self.unattached.iter().filter_map(|id| self.policies.get(id))
    }

    pub fn is_attached(&self, kind: PolicyKind, key: &ObjectKey) -> bool {
        let id = (kind, key.clone());
        self.policies.contains_key(&id) && !self.unattached.contains(&id)
    }

    /// Enumerates every route rule reachable from a listener, ordered by gateway, listener
    /// declaration, route and rule declaration.
    pub fn paths(&self) -> Vec<Path> {
        let mut paths = Vec::new();
        for (gw_key, gw) in &self.gateways {
            for listener in &gw.gateway.listeners {
                for route_key in &gw.routes {
                    let Some(route) = self.routes.get(route_key).map(|n| &n.route) else {
                        continue;
                    };
                    let Some(hostnames) = attaches(gw_key, listener, route) else {
                        continue;
                    };
                    for rule in &route.rules {
                        paths.push(Path {
                            gateway: gw_key.clone(),
                            listener: listener.name.clone(),
                            route: route_key.clone(),
                            rule: rule.name.clone(),
                            hostnames: hostnames.clone(),
                        });
                    }
                }
            }
        }
        paths
    }

    /// Checks that each element of a `class -> gateway -> listener -> route -> rule` path belongs
    /// to the element before it. A path may start at any element that can be identified on its
    /// own, i.e. a class, a gateway or a route.
    pub fn validate_path(&self, path: &[PathNode]) -> Result<(), PathError> {
        let Some(first) = path.first() else {
            return fail(0, PathErrorReason::Empty);
        };

        match first {
            PathNode::GatewayClass(class) => {
                if !self.gateways.values().any(|n| n.gateway.class_name == *class) {
                    return fail(0, PathErrorReason::UnknownNode(format!("gateway class {class}")));
                }
            }
            PathNode::Gateway(key) => {
                if !self.gateways.contains_key(key) {
                    return fail(0, PathErrorReason::UnknownNode(format!("gateway {key}")));
                }
            }
            PathNode::Route(key) => {
                if !self.routes.contains_key(key) {
                    return fail(0, PathErrorReason::UnknownNode(format!("route {key}")));
                }
            }
            PathNode::Listener(_) | PathNode::RouteRule(_) => {
                return fail(0, PathErrorReason::UnexpectedNode);
            }
        }

        let mut gateway: Option<&GatewayNode> = match first {
            PathNode::Gateway(key) => self.gateways.get(key),
            _ => None,
        };
        let mut listener: Option<&Listener> = None;

        for (index, pair) in path.windows(2).enumerate() {
            let index = index + 1;
            match (&pair[0], &pair[1]) {
                (PathNode::GatewayClass(class), PathNode::Gateway(key)) => {
                    let Some(gw) = self.gateways.get(key) else {
                        return fail(index, PathErrorReason::UnknownNode(format!("gateway {key}")));
                    };
                    if gw.gateway.class_name != *class {
                        return fail(
                            index,
                            PathErrorReason::GatewayClassMismatch {
                                class: class.clone(),
                                gateway: key.clone(),
                            },
                        );
                    }
                    gateway = Some(gw);
                }

                (PathNode::Gateway(key), PathNode::Listener(name)) => {
                    let found = gateway.and_then(|gw| {
                        gw.gateway.listeners.iter().find(|l| l.name == *name)
                    });
                    match found {
                        Some(l) => listener = Some(l),
                        None => {
                            return fail(
                                index,
                                PathErrorReason::ListenerNotInGateway {
                                    gateway: key.clone(),
                                    listener: name.clone(),
                                },
                            )
                        }
                    }
                }

                (PathNode::Listener(name), PathNode::Route(key)) => {
                    let Some(route) = self.routes.get(key).map(|n| &n.route) else {
                        return fail(index, PathErrorReason::UnknownNode(format!("route {key}")));
                    };
                    // The previous pair established both the gateway and the listener.
                    let (Some(gw), Some(l)) = (gateway, listener) else {
                        return fail(index, PathErrorReason::UnexpectedNode);
                    };
                    let gw_key = &gw.gateway.key;

                    let accepted = route
                        .parents
                        .iter()
                        .filter(|p| p.accepted && p.gateway == *gw_key)
                        .collect::<Vec<_>>();
                    if accepted.is_empty() {
                        return fail(
                            index,
                            PathErrorReason::RouteNotAccepted {
                                gateway: gw_key.clone(),
                                route: key.clone(),
                            },
                        );
                    }
                    if !accepted
                        .iter()
                        .any(|p| p.section_name.as_deref().map_or(true, |s| s == name))
                    {
                        return fail(
                            index,
                            PathErrorReason::SectionMismatch {
                                route: key.clone(),
                                listener: name.clone(),
                            },
                        );
                    }
                    if routes::effective_hostnames(l.hostname.as_deref(), &route.hostnames)
                        .is_none()
                    {
                        return fail(
                            index,
                            PathErrorReason::HostnameMismatch {
                                route: key.clone(),
                                listener: name.clone(),
                            },
                        );
                    }
                }

                (PathNode::Route(key), PathNode::RouteRule(name)) => {
                    let found = self
                        .routes
                        .get(key)
                        .map_or(false, |n| n.route.rules.iter().any(|r| r.name == *name));
                    if !found {
                        return fail(
                            index,
                            PathErrorReason::RuleNotInRoute {
                                route: key.clone(),
                                rule: name.clone(),
                            },
                        );
                    }
                }

                _ => return fail(index, PathErrorReason::UnexpectedNode),
            }
        }

        Ok(())
    }

    fn resolve_target(&self, policy: &Policy, target: &crate::TargetRef) -> Option<NodeRef> {
        let key = target.object_key(&policy.key().namespace);

        if target.targets_gateway() {
            let gw = self.gateways.get(&key)?;
            return match &target.section_name {
                None => Some(NodeRef::Gateway(key)),
                Some(section) => gw
                    .gateway
                    .listeners
                    .iter()
                    .any(|l| l.name == *section)
                    .then(|| NodeRef::Listener {
                        gateway: key,
                        name: section.clone(),
                    }),
            };
        }

        if target.targets_http_route() && policy.kind().targets_routes() {
            let route = self.routes.get(&key)?;
            return match &target.section_name {
                None => Some(NodeRef::Route(key)),
                Some(section) => route
                    .route
                    .rules
                    .iter()
                    .any(|r| r.name == *section)
                    .then(|| NodeRef::RouteRule {
                        route: key,
                        name: section.clone(),
                    }),
            };
        }

        None
    }
}

fn fail(index: usize, reason: PathErrorReason) -> Result<(), PathError> {
    Err(PathError { index, reason })
}

/// Determines whether a route attaches to a gateway listener, returning the hostnames it serves
/// there.
fn attaches(gateway: &ObjectKey, listener: &Listener, route: &Route) -> Option<Vec<String>> {
    let selected = route.parents.iter().any(|p| {
        p.accepted
            && p.gateway == *gateway
            && p.section_name.as_deref().map_or(true, |s| s == listener.name)
    });
    if !selected {
        return None;
    }
    routes::effective_hostnames(listener.hostname.as_deref(), &route.hostnames)
}

// === impl Path ===

impl Path {
    /// The nodes whose policies apply to this path, from least to most specific.
    pub fn attachment_points(&self) -> [NodeRef; 4] {
        [
            NodeRef::Gateway(self.gateway.clone()),
            NodeRef::Listener {
                gateway: self.gateway.clone(),
                name: self.listener.clone(),
            },
            NodeRef::Route(self.route.clone()),
            NodeRef::RouteRule {
                route: self.route.clone(),
                name: self.rule.clone(),
            },
        ]
    }
}
