//! Resolver registration and lookup.

use std::collections::HashMap;
use std::fmt;

use futures::FutureExt;

use crate::context::Context;
use crate::context::UseDefault;
use crate::error::Error;
use crate::graph::Graph;
use crate::graph::GraphNode;
use crate::middleware::Middleware;
use crate::middleware::Next;

/// Host supplied logic bound to a graph node.
#[derive(Clone)]
pub struct Resolver {
    node: GraphNode,
    middlewares: Vec<Middleware>,
}

impl Resolver {
    pub fn node(&self) -> &GraphNode {
        &self.node
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("node", &self.node)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

/// Binds `middlewares` to `node`, outermost first.
pub fn resolver(node: &GraphNode, middlewares: impl IntoIterator<Item = Middleware>) -> Resolver {
    Resolver {
        node: node.clone(),
        middlewares: middlewares.into_iter().collect(),
    }
}

/// Resolvers that replace an undefined value left at the end of the chain by `{}` for objects
/// and `[]` for arrays.
pub fn default_resolver<'a>(nodes: impl IntoIterator<Item = &'a GraphNode>) -> Vec<Resolver> {
    nodes
        .into_iter()
        .map(|node| resolver(node, [use_default()]))
        .collect()
}

fn use_default() -> Middleware {
    std::sync::Arc::new(|context: Context, next: Next| {
        async move {
            let node = context.node()?.clone();
            next.run(context.push_scoped::<UseDefault>(&node, ())).await
        }
        .boxed()
    })
}

/// Every registered middleware, indexed by the identity of the structure it resolves.
#[derive(Default)]
pub(crate) struct Registry {
    by_structure: HashMap<usize, Vec<Middleware>>,
    resolvers: usize,
}

impl Registry {
    /// Indexes `resolvers`, rejecting any whose node was not reached from `graph`.
    pub(crate) fn new(graph: &Graph, resolvers: Vec<Resolver>) -> Result<Self, Error> {
        let root = graph.root();
        let mut registry = Registry::default();
        for resolver in resolvers {
            if resolver.node.root() != root {
                failfast_error!(
                    key = resolver.node.key(),
                    "resolver registered on a node of another graph"
                );
                return Err(Error::InvalidResolverPath {
                    key: resolver.node.key().to_string(),
                });
            }
            registry.resolvers += 1;
            registry
                .by_structure
                .entry(resolver.node.structure_id())
                .or_default()
                .extend(resolver.middlewares);
        }
        tracing::debug!(
            resolvers = registry.resolvers,
            nodes = registry.by_structure.len(),
            "resolver registry built"
        );
        Ok(registry)
    }

    /// The middlewares registered on `node`, in declaration order.
    pub(crate) fn middlewares_for(&self, node: &GraphNode) -> Vec<Middleware> {
        self.by_structure
            .get(&node.structure_id())
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn len(&self) -> usize {
        self.resolvers
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("resolvers", &self.resolvers)
            .field("nodes", &self.by_structure.len())
            .finish()
    }
}
