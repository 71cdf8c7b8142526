//! Destination table of the notice board with the minimum role each one requires.

use super::role::MinimumRole;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Route {
    pub pattern: &'static str,
    pub requirement: MinimumRole,
}

impl Route {
    const fn new(pattern: &'static str, requirement: MinimumRole) -> Self {
        Self {
            pattern,
            requirement,
        }
    }
}

pub const ROUTES: &[Route] = &[
    Route::new("/auth", MinimumRole::None),
    Route::new("/", MinimumRole::User),
    Route::new("/notices", MinimumRole::User),
    Route::new("/notice/:id", MinimumRole::User),
    Route::new("/calendar", MinimumRole::User),
    Route::new("/archive", MinimumRole::User),
    Route::new("/notice/:id/edit", MinimumRole::Admin),
    Route::new("/users", MinimumRole::Admin),
    Route::new("/settings", MinimumRole::Admin),
];

/// Fallback for unknown paths; the not-found page is public.
pub const NOT_FOUND: Route = Route::new("*", MinimumRole::None);

/// Strips query, fragment and trailing slashes.
#[must_use]
pub fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

fn matches(pattern: &str, path: &str) -> bool {
    let mut pattern_segments = pattern.split('/');
    let mut path_segments = path.split('/');

    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (None, None) => return true,
            (Some(expected), Some(actual)) => {
                let matched = if expected.starts_with(':') {
                    !actual.is_empty()
                } else {
                    expected == actual
                };
                if !matched {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

/// Route declared for `path`, or [`NOT_FOUND`].
#[must_use]
pub fn resolve(path: &str) -> &'static Route {
    let path = normalize(path);
    ROUTES
        .iter()
        .find(|route| matches(route.pattern, path))
        .unwrap_or(&NOT_FOUND)
}

#[must_use]
pub fn requirement_for(path: &str) -> MinimumRole {
    resolve(path).requirement
}
