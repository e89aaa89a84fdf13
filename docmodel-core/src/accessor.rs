//! Custom getters and setters for individual attributes.
//!
//! A setter replaces the cast table for writes to its field; a getter post-processes reads.

use bson::Bson;
use std::{collections::HashMap, fmt, sync::Arc};

pub type AccessorFn = Arc<dyn Fn(Bson) -> Bson + Send + Sync>;

#[derive(Clone, Default)]
pub struct Accessors {
    getters: HashMap<String, AccessorFn>,
    setters: HashMap<String, AccessorFn>,
}

impl Accessors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a getter applied to `field` whenever it is read from an entity.
    pub fn getter<F>(mut self, field: impl Into<String>, getter: F) -> Self
    where
        F: Fn(Bson) -> Bson + Send + Sync + 'static,
    {
        self.getters.insert(field.into(), Arc::new(getter));
        self
    }

    /// Registers a setter applied to `field` whenever it is written, in place of its cast.
    pub fn setter<F>(mut self, field: impl Into<String>, setter: F) -> Self
    where
        F: Fn(Bson) -> Bson + Send + Sync + 'static,
    {
        self.setters.insert(field.into(), Arc::new(setter));
        self
    }

    pub fn get(&self, field: &str, value: Bson) -> Bson {
        match self.getters.get(field) {
            Some(getter) => getter(value),
            None => value,
        }
    }

    /// Runs the setter for `field`, or returns `Err(value)` when none is declared.
    pub fn set(&self, field: &str, value: Bson) -> Result<Bson, Bson> {
        match self.setters.get(field) {
            Some(setter) => Ok(setter(value)),
            None => Err(value),
        }
    }
}

impl fmt::Debug for Accessors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessors")
            .field("getters", &self.getters.keys().collect::<Vec<_>>())
            .field("setters", &self.setters.keys().collect::<Vec<_>>())
            .finish()
    }
}
