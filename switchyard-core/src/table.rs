use crate::error::SwitchyardError;
use crate::path;
use crate::route::{HttpMethod, MiddlewareKey, RouteEntry, RouteGroup, RouteNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

/// What to do when a path is declared twice for the same method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateRoutePolicy {
    /// Keep the first declaration and log the conflict.
    #[default]
    Skip,
    /// Replace the earlier declaration.
    Overwrite,
    /// Fail the table build.
    Reject,
}

/// A route entry with its final middleware list, outermost first.
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub entry: RouteEntry,
    pub middlewares: Arc<[MiddlewareKey]>,
}

/// Everything registered at one canonical path.
///
/// A path holds either one entry or a method group, never both, so dispatch
/// cannot read a stale standalone entry once a sibling method appears.
#[derive(Debug, Clone)]
pub enum Dispatch {
    Single(ResolvedRoute),
    Methods(BTreeMap<HttpMethod, ResolvedRoute>),
}

impl Dispatch {
    pub fn get(&self, method: HttpMethod) -> Option<&ResolvedRoute> {
        match self {
            Dispatch::Single(route) if route.entry.method == method => Some(route),
            Dispatch::Single(_) => None,
            Dispatch::Methods(group) => group.get(&method),
        }
    }

    pub fn methods(&self) -> Vec<HttpMethod> {
        match self {
            Dispatch::Single(route) => vec![route.entry.method],
            Dispatch::Methods(group) => group.keys().copied().collect(),
        }
    }

    pub fn routes(&self) -> Box<dyn Iterator<Item = &ResolvedRoute> + '_> {
        match self {
            Dispatch::Single(route) => Box::new(std::iter::once(route)),
            Dispatch::Methods(group) => Box::new(group.values()),
        }
    }

    fn into_routes(self) -> Vec<ResolvedRoute> {
        match self {
            Dispatch::Single(route) => vec![route],
            Dispatch::Methods(group) => group.into_values().collect(),
        }
    }
}

pub type RouteMap = BTreeMap<String, Dispatch>;

/// Derive a child's inherited list. Always a fresh allocation when the group
/// adds anything; the parent's list is shared read-only otherwise.
pub fn extend(inherited: &Arc<[MiddlewareKey]>, own: &[MiddlewareKey]) -> Arc<[MiddlewareKey]> {
    if own.is_empty() {
        return Arc::clone(inherited);
    }
    let mut list = inherited.to_vec();
    for key in own {
        if !list.contains(key) {
            list.push(key.clone());
        }
    }
    list.into()
}

/// Compute the middleware a route runs, outermost first.
///
/// Inherited middleware wraps the route's own, so `inherited = [C]` with own
/// `[A, B]` runs `C, A, B`. A key the route declares itself takes the route's
/// position instead of the inherited one. Exclusions remove a key from the
/// final list wherever it came from.
pub fn resolve(entry: RouteEntry, inherited: &Arc<[MiddlewareKey]>) -> ResolvedRoute {
    if entry.middlewares.is_empty() && entry.exclude.is_empty() {
        return ResolvedRoute {
            middlewares: Arc::clone(inherited),
            entry,
        };
    }

    let mut list: Vec<MiddlewareKey> = Vec::with_capacity(inherited.len() + entry.middlewares.len());
    for key in inherited.iter() {
        if entry.middlewares.contains(key) || entry.exclude.contains(key) || list.contains(key) {
            continue;
        }
        list.push(key.clone());
    }
    for key in &entry.middlewares {
        if entry.exclude.contains(key) || list.contains(key) {
            continue;
        }
        list.push(key.clone());
    }

    ResolvedRoute {
        middlewares: list.into(),
        entry,
    }
}

/// Add one resolved route at `path`, promoting to a method group when a
/// second method appears.
pub fn insert(
    map: &mut RouteMap,
    path: String,
    route: ResolvedRoute,
    policy: DuplicateRoutePolicy,
) -> Result<(), SwitchyardError> {
    let method = route.entry.method;

    let Some(existing) = map.remove(&path) else {
        map.insert(path, Dispatch::Single(route));
        return Ok(());
    };

    let mut group = match existing {
        Dispatch::Single(first) => {
            let mut group = BTreeMap::new();
            group.insert(first.entry.method, first);
            group
        }
        Dispatch::Methods(group) => group,
    };

    if group.contains_key(&method) {
        match policy {
            DuplicateRoutePolicy::Skip => {
                warn!(method = %method, path = %path, "Route already exists, keeping first declaration");
            }
            DuplicateRoutePolicy::Overwrite => {
                warn!(method = %method, path = %path, "Route already exists, overwriting");
                group.insert(method, route);
            }
            DuplicateRoutePolicy::Reject => {
                return Err(SwitchyardError::DuplicateRoute {
                    method: method.to_string(),
                    path,
                });
            }
        }
    } else {
        group.insert(method, route);
    }

    let dispatch = if group.len() == 1 {
        match group.into_values().next() {
            Some(only) => Dispatch::Single(only),
            None => return Ok(()),
        }
    } else {
        Dispatch::Methods(group)
    };
    map.insert(path, dispatch);
    Ok(())
}

/// Fold `from` into `into` entry by entry, under the same duplicate policy.
pub fn merge(
    into: &mut RouteMap,
    from: RouteMap,
    policy: DuplicateRoutePolicy,
) -> Result<(), SwitchyardError> {
    for (path, dispatch) in from {
        for route in dispatch.into_routes() {
            insert(into, path.clone(), route, policy)?;
        }
    }
    Ok(())
}

/// Walk a group and its descendants into canonical path → dispatch entries.
pub fn flatten(
    group: &RouteGroup,
    parent: &str,
    inherited: &Arc<[MiddlewareKey]>,
    policy: DuplicateRoutePolicy,
) -> Result<RouteMap, SwitchyardError> {
    let base = path::normalize(&group.prefix, parent);
    let inherited = extend(inherited, &group.middlewares);

    let mut local = RouteMap::new();
    for child in &group.children {
        match child {
            RouteNode::Group(sub) => {
                let sub_routes = flatten(sub, &base, &inherited, policy)?;
                merge(&mut local, sub_routes, policy)?;
            }
            RouteNode::Route(decl) => {
                let mut entry = decl.clone();
                entry.path = path::normalize(&decl.path, &base);
                let full = entry.path.clone();
                let resolved = resolve(entry, &inherited);
                debug!(method = %resolved.entry.method, path = %full, "Route declared");
                insert(&mut local, full, resolved, policy)?;
            }
        }
    }
    Ok(local)
}

/// Flattened, resolved routes of a whole application. Built once; read-only
/// afterwards.
#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    routes: RouteMap,
}

impl DispatchTable {
    /// Flatten every top-level group under `defaults`.
    pub fn build(
        groups: &[RouteGroup],
        defaults: &[MiddlewareKey],
        policy: DuplicateRoutePolicy,
    ) -> Result<Self, SwitchyardError> {
        let root: Arc<[MiddlewareKey]> = defaults.to_vec().into();
        let mut routes = RouteMap::new();
        for group in groups {
            let flat = flatten(group, "", &root, policy)?;
            merge(&mut routes, flat, policy)?;
        }
        tracing::info!(paths = routes.len(), "Dispatch table built");
        Ok(Self { routes })
    }

    pub fn get(&self, path: &str) -> Option<&Dispatch> {
        self.routes.get(path)
    }

    /// Paths in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Dispatch)> {
        self.routes.iter().map(|(p, d)| (p.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Sorted `METHOD\tpath` listing, optionally with each route's middleware.
    pub fn describe(&self, with_middlewares: bool) -> String {
        let mut out = String::new();
        for (path, dispatch) in &self.routes {
            for route in dispatch.routes() {
                let _ = write!(out, "\n{}:\t{}", route.entry.method, path);
                if with_middlewares && !route.middlewares.is_empty() {
                    out.push_str("\n    Middlewares:");
                    for key in route.middlewares.iter() {
                        let _ = write!(out, "\n        {key}");
                    }
                }
            }
        }
        out
    }
}
