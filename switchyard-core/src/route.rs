use crate::handler::Handler;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// HTTP methods a route can be declared for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Map a wire method. Extension methods have no route counterpart.
    pub fn from_http(method: &http::Method) -> Option<Self> {
        match method.as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "DELETE" => Some(HttpMethod::Delete),
            "PATCH" => Some(HttpMethod::Patch),
            "HEAD" => Some(HttpMethod::Head),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }

    pub fn matches(&self, method: &http::Method) -> bool {
        self.as_str() == method.as_str()
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable symbolic identity of a middleware implementation.
///
/// Inheritance, deduplication and exclusion all compare keys by value, so two
/// independently constructed instances of the same middleware are the same
/// middleware.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MiddlewareKey(Cow<'static, str>);

impl MiddlewareKey {
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for MiddlewareKey {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl From<String> for MiddlewareKey {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl fmt::Display for MiddlewareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authorization requirement checked by the delegated account service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteAuth {
    pub app: String,
    pub permission: String,
}

/// One path + method + action declaration.
///
/// `path` is relative to the enclosing group until the table is built; the
/// flattener rewrites it to the canonical absolute path.
#[derive(Clone)]
pub struct RouteEntry {
    pub path: String,
    pub method: HttpMethod,
    pub action: Handler,
    /// Route-specific middleware, innermost last.
    pub middlewares: Vec<MiddlewareKey>,
    /// Middleware this route must never run, whatever its ancestors declare.
    pub exclude: Vec<MiddlewareKey>,
    pub auth: Option<RouteAuth>,
}

impl RouteEntry {
    pub fn new(method: HttpMethod, path: impl Into<String>, action: Handler) -> Self {
        Self {
            path: path.into(),
            method,
            action,
            middlewares: Vec::new(),
            exclude: Vec::new(),
            auth: None,
        }
    }

    pub fn get(path: impl Into<String>, action: Handler) -> Self {
        Self::new(HttpMethod::Get, path, action)
    }

    pub fn post(path: impl Into<String>, action: Handler) -> Self {
        Self::new(HttpMethod::Post, path, action)
    }

    pub fn put(path: impl Into<String>, action: Handler) -> Self {
        Self::new(HttpMethod::Put, path, action)
    }

    pub fn patch(path: impl Into<String>, action: Handler) -> Self {
        Self::new(HttpMethod::Patch, path, action)
    }

    pub fn delete(path: impl Into<String>, action: Handler) -> Self {
        Self::new(HttpMethod::Delete, path, action)
    }

    pub fn middleware(mut self, key: impl Into<MiddlewareKey>) -> Self {
        self.middlewares.push(key.into());
        self
    }

    pub fn exclude(mut self, key: impl Into<MiddlewareKey>) -> Self {
        self.exclude.push(key.into());
        self
    }

    pub fn auth(mut self, app: impl Into<String>, permission: impl Into<String>) -> Self {
        self.auth = Some(RouteAuth {
            app: app.into(),
            permission: permission.into(),
        });
        self
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("path", &self.path)
            .field("method", &self.method)
            .field("middlewares", &self.middlewares)
            .field("exclude", &self.exclude)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

/// A child of a [`RouteGroup`].
#[derive(Debug, Clone)]
pub enum RouteNode {
    Group(RouteGroup),
    Route(RouteEntry),
}

/// A prefix, the middleware every descendant inherits, and the children in
/// declaration order.
#[derive(Debug, Clone, Default)]
pub struct RouteGroup {
    pub prefix: String,
    pub middlewares: Vec<MiddlewareKey>,
    pub children: Vec<RouteNode>,
}

impl RouteGroup {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            middlewares: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn middleware(mut self, key: impl Into<MiddlewareKey>) -> Self {
        self.middlewares.push(key.into());
        self
    }

    pub fn route(mut self, entry: RouteEntry) -> Self {
        self.children.push(RouteNode::Route(entry));
        self
    }

    pub fn group(mut self, group: RouteGroup) -> Self {
        self.children.push(RouteNode::Group(group));
        self
    }
}
