//! Versioned route groups.
//!
//! # Responsibilities
//! - Compute the mount prefix of every group the same way
//! - Hold the table of groups and mount it as one router
//! - Stand in for groups whose domain logic is not plugged in yet
//!
//! # Design Decisions
//! - A group owns everything below its prefix; the table only nests it
//! - Group names are validated once, at mount time
//! - Plugging a real group in replaces the placeholder of the same name

use std::sync::Arc;

use axum::{routing::any, Router};
use thiserror::Error;

use crate::http::error::ApiError;
use crate::http::server::AppState;

/// Version segment shared by every group prefix.
pub const API_VERSION: &str = "v1";

/// Groups making up the public API surface.
pub const GROUP_NAMES: [&str; 10] = [
    "auth",
    "users",
    "categories",
    "videos",
    "comments",
    "replies",
    "feelings",
    "subscriptions",
    "histories",
    "search",
];

/// Mount prefix for a group.
pub fn versioned_prefix(name: &str) -> String {
    format!("/api/{API_VERSION}/{name}")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("route group name `{0}` must be lowercase letters, digits or '-'")]
    InvalidName(String),
}

/// A collaborator serving everything under one versioned prefix.
pub trait RouteGroup: Send + Sync {
    fn name(&self) -> &str;

    /// Routes relative to the group prefix, with state already applied.
    fn router(&self, state: &AppState) -> Router;
}

/// Answers 501 for every request until a real group takes its place.
#[derive(Debug, Clone)]
pub struct PendingGroup {
    name: String,
}

impl PendingGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl RouteGroup for PendingGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn router(&self, _state: &AppState) -> Router {
        let name = self.name.clone();
        let pending = move || {
            let name = name.clone();
            async move { ApiError::NotImplemented(versioned_prefix(&name)) }
        };
        Router::new()
            .route("/", any(pending.clone()))
            .route("/{*rest}", any(pending))
    }
}

/// Ordered set of route groups, unique by name.
#[derive(Clone, Default)]
pub struct RouteTable {
    groups: Vec<Arc<dyn RouteGroup>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with a [`PendingGroup`] for each of [`GROUP_NAMES`].
    pub fn placeholders() -> Self {
        GROUP_NAMES
            .iter()
            .fold(Self::new(), |table, name| table.with(PendingGroup::new(*name)))
    }

    /// Add `group`, replacing any group with the same name in place.
    pub fn with(mut self, group: impl RouteGroup + 'static) -> Self {
        let group: Arc<dyn RouteGroup> = Arc::new(group);
        match self.groups.iter().position(|g| g.name() == group.name()) {
            Some(index) => self.groups[index] = group,
            None => self.groups.push(group),
        }
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn validate(&self) -> Result<(), RoutingError> {
        for group in &self.groups {
            let name = group.name();
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
            if !valid {
                return Err(RoutingError::InvalidName(name.to_string()));
            }
        }
        Ok(())
    }

    /// Nest every group under its versioned prefix.
    pub fn mount(&self, state: &AppState) -> Result<Router, RoutingError> {
        self.validate()?;
        let router = self.groups.iter().fold(Router::new(), |router, group| {
            let prefix = versioned_prefix(group.name());
            tracing::debug!(group = group.name(), %prefix, "Mounting route group");
            router.nest(&prefix, group.router(state))
        });
        Ok(router)
    }
}
