// Declarative route table: longest-prefix match, optional prefix stripping

use crate::config::RouteConfig;

#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a RouteConfig,
    pub upstream_path: String,
}

pub struct RouteTable {
    // Sorted by descending prefix length so the most specific route wins.
    routes: Vec<RouteConfig>,
}

impl RouteTable {
    pub fn new(mut routes: Vec<RouteConfig>) -> Self {
        routes.sort_by(|a, b| b.path_prefix.len().cmp(&a.path_prefix.len()));
        Self { routes }
    }

    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        let route = self.routes.iter().find(|route| {
            let prefix = route.path_prefix.as_str();
            path == prefix || path.starts_with(&format!("{}/", prefix))
        })?;

        Some(RouteMatch {
            upstream_path: strip_segments(path, route.strip_prefix),
            route,
        })
    }

    pub fn routes(&self) -> &[RouteConfig] {
        &self.routes
    }
}

/// Removes the first `count` path segments: `/api/stock-levels` stripped by
/// one becomes `/stock-levels`.
fn strip_segments(path: &str, count: usize) -> String {
    if count == 0 {
        return path.to_string();
    }
    let remaining: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .skip(count)
        .collect();
    if remaining.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", remaining.join("/"))
    }
}
