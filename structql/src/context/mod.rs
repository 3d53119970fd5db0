//! The layered resolution context.
//!
//! A [`Context`] is a persistent stack of typed layers. Pushing returns a new context that shares
//! its tail with the old one, so any number of branches may grow from the same context
//! concurrently without coordination.


use std::any::Any;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::graph::GraphNode;
use crate::json_ext::Value;

/// A key that can be stored in a [`Context`].
///
/// Keys are zero sized marker types; the stored type is [`ContextKey::Value`].
///
/// ```ignore
/// struct CurrentUser;
///
/// impl ContextKey for CurrentUser {
///     type Value = String;
///     const NAME: &'static str = "current_user";
/// }
/// ```
pub trait ContextKey: 'static {
    type Value: Send + Sync + 'static;

    /// Name used in [`Error::MissingContextKey`].
    const NAME: &'static str;
}

/// The value being resolved for the active node.
///
/// `None` is the undefined value: nothing was resolved yet. It is distinct from JSON `null`.
pub struct CurrentValue;

impl ContextKey for CurrentValue {
    type Value = Option<Value>;
    const NAME: &'static str = "value";
}

/// The graph node whose resolvers are running.
pub struct ActiveNode;

impl ContextKey for ActiveNode {
    type Value = GraphNode;
    const NAME: &'static str = "node";
}

/// Input attached by the query to a node, such as call arguments or pagination parameters.
///
/// Always scoped to the node it was given for.
pub struct Input;

impl ContextKey for Input {
    type Value = Value;
    const NAME: &'static str = "input";
}

/// The value of the enclosing object or list.
pub struct Parent;

impl ContextKey for Parent {
    type Value = Value;
    const NAME: &'static str = "parent";
}

/// Position of the list item being resolved.
pub struct Index;

impl ContextKey for Index {
    type Value = usize;
    const NAME: &'static str = "index";
}

/// Set, scoped to a list node, by a resolver that already sliced the collection.
pub(crate) struct Paginated;

impl ContextKey for Paginated {
    type Value = ();
    const NAME: &'static str = "paginated";
}

/// Set, scoped to a node, by [`crate::default_resolver`].
pub(crate) struct UseDefault;

impl ContextKey for UseDefault {
    type Value = ();
    const NAME: &'static str = "use_default";
}

struct Layer {
    key: TypeId,
    scope: Option<GraphNode>,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Layer>>,
}

/// Immutable, layered, key addressed state threaded through one query's resolution.
///
/// Lookups walk from the most recent layer down, so the latest push for a key wins.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Layer>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a context with `value` stored under `K`.
    pub fn push<K: ContextKey>(&self, value: K::Value) -> Self {
        self.push_layer(TypeId::of::<K>(), None, Arc::new(value))
    }

    /// Returns a context with `value` stored under `K`, visible only to lookups for `node`.
    pub fn push_scoped<K: ContextKey>(&self, node: &GraphNode, value: K::Value) -> Self {
        self.push_layer(TypeId::of::<K>(), Some(node.clone()), Arc::new(value))
    }

    fn push_layer(
        &self,
        key: TypeId,
        scope: Option<GraphNode>,
        value: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        Context {
            head: Some(Arc::new(Layer {
                key,
                scope,
                value,
                parent: self.head.clone(),
            })),
        }
    }

    /// The most recent unscoped value stored under `K`.
    pub fn get<K: ContextKey>(&self) -> Option<&K::Value> {
        self.find::<K>(None)
    }

    /// The most recent value stored under `K` for `node`.
    pub fn get_scoped<K: ContextKey>(&self, node: &GraphNode) -> Option<&K::Value> {
        self.find::<K>(Some(node))
    }

    pub fn get_or_fail<K: ContextKey>(&self) -> Result<&K::Value, Error> {
        self.get::<K>()
            .ok_or(Error::MissingContextKey { key: K::NAME })
    }

    pub fn get_scoped_or_fail<K: ContextKey>(&self, node: &GraphNode) -> Result<&K::Value, Error> {
        self.get_scoped::<K>(node)
            .ok_or(Error::MissingContextKey { key: K::NAME })
    }

    fn find<K: ContextKey>(&self, scope: Option<&GraphNode>) -> Option<&K::Value> {
        let key = TypeId::of::<K>();
        let mut current = self.head.as_deref();
        while let Some(layer) = current {
            if layer.key == key && layer.scope.as_ref() == scope {
                return layer.value.downcast_ref::<K::Value>();
            }
            current = layer.parent.as_deref();
        }
        None
    }

    /// Number of layers, for diagnostics.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.head.as_deref();
        while let Some(layer) = current {
            depth += 1;
            current = layer.parent.as_deref();
        }
        depth
    }

    /// Returns a context whose current value is `value`.
    pub fn with_value(&self, value: impl Into<Value>) -> Self {
        self.push::<CurrentValue>(Some(value.into()))
    }

    /// Returns a context whose current value is undefined.
    pub fn without_value(&self) -> Self {
        self.push::<CurrentValue>(None)
    }

    pub(crate) fn with_optional_value(&self, value: Option<Value>) -> Self {
        self.push::<CurrentValue>(value)
    }

    /// The current value, or `None` when it is undefined.
    pub fn value(&self) -> Option<&Value> {
        self.get::<CurrentValue>().and_then(Option::as_ref)
    }

    /// The node whose resolvers are running.
    pub fn node(&self) -> Result<&GraphNode, Error> {
        self.get_or_fail::<ActiveNode>()
    }

    pub(crate) fn with_node(&self, node: &GraphNode) -> Self {
        self.push::<ActiveNode>(node.clone())
    }

    /// The input the query attached to `node`.
    pub fn input(&self, node: &GraphNode) -> Option<&Value> {
        self.get_scoped::<Input>(node)
    }

    /// Sets an already sliced collection as the value of the active list node.
    ///
    /// The engine skips its own pagination of the node when it sees this.
    pub fn with_paginated_value(&self, value: impl Into<Value>) -> Result<Self, Error> {
        let node = self.node()?.clone();
        Ok(self.push_scoped::<Paginated>(&node, ()).with_value(value))
    }

    pub(crate) fn is_paginated(&self, node: &GraphNode) -> bool {
        self.get_scoped::<Paginated>(node).is_some()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("depth", &self.depth())
            .field("value", &self.value())
            .finish()
    }
}
