//! Resolves path shaped queries against a typed structure graph.
//!
//! A host describes its data as a [`Schema`], binds resolver [`Middleware`] to nodes of the
//! [`Graph`] navigated from it, and runs client queries through an [`Engine`]:
//!
//! ```ignore
//! let graph = Graph::new(Schema::from_json(SCHEMA)?);
//! let members = graph.at(&["Graph", "members"])?;
//! let engine = Engine::builder()
//!     .graph(graph.clone())
//!     .entry("Graph")
//!     .resolvers(vec![resolver(&members, [load_members()])])
//!     .build()?;
//! let data = engine.run(&json!(["Graph", "members", {"kind": "first"}]), &[]).await?;
//! ```

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

pub mod configuration;
pub mod context;
mod engine;
pub mod error;
pub mod graph;
pub mod json_ext;
pub mod middleware;
pub mod query;
mod registry;
pub mod schema;
pub mod services;
pub mod union_matcher;

pub use crate::configuration::Configuration;
pub use crate::context::Context;
pub use crate::context::ContextKey;
pub use crate::engine::Engine;
pub use crate::error::Error;
pub use crate::error::ErrorCategory;
pub use crate::graph::Graph;
pub use crate::graph::GraphNode;
pub use crate::middleware::Middleware;
pub use crate::middleware::Next;
pub use crate::query::Operator;
pub use crate::registry::default_resolver;
pub use crate::registry::resolver;
pub use crate::registry::Resolver;
pub use crate::schema::Schema;
pub use crate::schema::Structure;
