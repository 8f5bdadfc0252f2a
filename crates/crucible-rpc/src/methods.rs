//! Named method registry
//!
//! A [`MethodTable`] is built once and shared (cheaply cloned) by every peer a
//! client or server creates. Methods receive positional parameters and return
//! `anyhow::Result<Value>`; see [`crate::dispatch`] for how failures are
//! reported.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A callable exposed to the remote side.
#[async_trait]
pub trait Method: Send + Sync {
    async fn call(&self, params: Vec<Value>) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> Method for F
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, params: Vec<Value>) -> anyhow::Result<Value> {
        (self)(params).await
    }
}

/// Immutable name -> method mapping.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: Arc<HashMap<String, Arc<dyn Method>>>,
}

impl MethodTable {
    pub fn builder() -> MethodTableBuilder {
        MethodTableBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Method>> {
        self.methods.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("MethodTable").field("methods", &names).finish()
    }
}

#[derive(Default)]
pub struct MethodTableBuilder {
    methods: HashMap<String, Arc<dyn Method>>,
}

impl MethodTableBuilder {
    /// Register an asynchronous method. A later registration under the same
    /// name replaces the earlier one.
    pub fn method<M: Method + 'static>(mut self, name: impl Into<String>, method: M) -> Self {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    /// Register a method that completes synchronously.
    pub fn sync_method<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.method(name, move |params: Vec<Value>| std::future::ready(f(params)))
    }

    pub fn build(self) -> MethodTable {
        MethodTable {
            methods: Arc::new(self.methods),
        }
    }
}
