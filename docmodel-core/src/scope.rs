//! Named, reusable query transforms registered per model.
//!
//! Scopes are looked up by name through [`QueryBuilder::scope`]; global scopes are additionally
//! applied to every builder a repository hands out.

use bson::Bson;
use indexmap::IndexMap;
use std::{fmt, sync::Arc};

use crate::{builder::QueryBuilder, model::Model};

pub type ScopeFn<M> = Arc<dyn Fn(QueryBuilder<M>, &[Bson]) -> QueryBuilder<M> + Send + Sync>;

struct Scope<M: Model> {
    apply: ScopeFn<M>,
    global: bool,
}

impl<M: Model> Clone for Scope<M> {
    fn clone(&self) -> Self {
        Self {
            apply: self.apply.clone(),
            global: self.global,
        }
    }
}

/// The scope registry of one model.
pub struct Scopes<M: Model> {
    scopes: IndexMap<String, Scope<M>>,
}

impl<M: Model> Scopes<M> {
    pub fn new() -> Self {
        Self {
            scopes: IndexMap::new(),
        }
    }

    /// Registers a scope invokable by name.
    pub fn scope<F>(mut self, name: impl Into<String>, scope: F) -> Self
    where
        F: Fn(QueryBuilder<M>, &[Bson]) -> QueryBuilder<M> + Send + Sync + 'static,
    {
        self.scopes.insert(
            name.into(),
            Scope {
                apply: Arc::new(scope),
                global: false,
            },
        );
        self
    }

    /// Registers a scope that every new builder for the model starts with.
    ///
    /// Global scopes are called with no arguments. They remain invokable by name as well.
    pub fn global<F>(mut self, name: impl Into<String>, scope: F) -> Self
    where
        F: Fn(QueryBuilder<M>, &[Bson]) -> QueryBuilder<M> + Send + Sync + 'static,
    {
        self.scopes.insert(
            name.into(),
            Scope {
                apply: Arc::new(scope),
                global: true,
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&ScopeFn<M>> {
        self.scopes.get(name).map(|scope| &scope.apply)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scopes.contains_key(name)
    }

    /// Global scopes in registration order.
    pub fn globals(&self) -> impl Iterator<Item = (&str, &ScopeFn<M>)> {
        self.scopes
            .iter()
            .filter(|(_, scope)| scope.global)
            .map(|(name, scope)| (name.as_str(), &scope.apply))
    }
}

impl<M: Model> Default for Scopes<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Clone for Scopes<M> {
    fn clone(&self) -> Self {
        Self {
            scopes: self.scopes.clone(),
        }
    }
}

impl<M: Model> fmt::Debug for Scopes<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.scopes
                    .iter()
                    .map(|(name, scope)| (name, if scope.global { "global" } else { "local" })),
            )
            .finish()
    }
}
