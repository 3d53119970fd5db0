//! The engine façade.

use std::sync::Arc;

use tracing::Instrument;

use crate::configuration::Configuration;
use crate::context::Context;
use crate::error::Error;
use crate::error::ErrorCategory;
use crate::graph::Graph;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::middleware::drain;
use crate::query::builtin_operators;
use crate::query::substitute_variables;
use crate::query::Compiler;
use crate::query::Operator;
use crate::registry::Registry;
use crate::registry::Resolver;

/// Resolves queries against one graph, starting from one root level declaration.
///
/// Cheap to clone; clones share the graph and the registered resolvers.
#[derive(Clone, Debug)]
pub struct Engine {
    compiler: Compiler,
}

#[buildstructor::buildstructor]
impl Engine {
    /// Creates an engine.
    ///
    /// Every resolver must have been registered on a node of `graph`, and `entry` must name one
    /// of its root level declarations. Host `operators` are tried before the built-in ones.
    #[builder(visibility = "pub")]
    fn new(
        graph: Graph,
        entry: String,
        resolvers: Vec<Resolver>,
        operators: Vec<Arc<dyn Operator>>,
        configuration: Option<Configuration>,
    ) -> Result<Self, Error> {
        if graph.schema().entry(&entry).is_none() {
            return Err(Error::InvalidSchema {
                reason: format!("entry '{entry}' is not a root level declaration"),
            });
        }
        let registry = Registry::new(&graph, resolvers)?;
        tracing::debug!(
            entry = %entry,
            resolvers = registry.len(),
            operators = operators.len(),
            "engine created"
        );
        let operators = operators.into_iter().chain(builtin_operators()).collect();
        let configuration = configuration.unwrap_or_default();
        configuration.validate()?;
        Ok(Engine {
            compiler: Compiler::new(graph, entry, registry, operators, configuration.execution),
        })
    }

    pub fn graph(&self) -> &Graph {
        self.compiler.graph()
    }

    pub fn entry(&self) -> &str {
        self.compiler.entry()
    }

    /// Compiles and runs `query`, substituting `variables` first.
    ///
    /// A failure anywhere aborts the whole run; there is no partial result. An undefined result
    /// is returned as `null`.
    pub async fn run(&self, query: &Value, variables: &[Value]) -> Result<Value, Error> {
        self.run_with_context(query, variables, Context::new())
            .await
    }

    /// Like [`Engine::run`], with host data seeded in the context every resolver sees.
    pub async fn run_with_context(
        &self,
        query: &Value,
        variables: &[Value],
        context: Context,
    ) -> Result<Value, Error> {
        let span = tracing::debug_span!("structql.run", entry = %self.entry());
        async {
            let result = self.execute(query, variables, context).await;
            if let Err(error) = &result {
                log_error(error);
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        query: &Value,
        variables: &[Value],
        context: Context,
    ) -> Result<Value, Error> {
        let query = substitute_variables(self.entry(), query, variables)?;
        let Value::Array(instructions) = &query else {
            return Err(Error::invalid_query(
                self.entry(),
                query.to_json_text(),
                "a query must be a list of instructions",
            ));
        };
        let middleware = self.compiler.compile_query(instructions)?;
        let context = drain(&middleware, context).await?;
        Ok(context.value().cloned().unwrap_or(Value::Null))
    }
}

fn log_error(error: &Error) {
    let code = error.extension_code();
    match error.category() {
        ErrorCategory::Client => tracing::debug!(code, %error, "query rejected"),
        ErrorCategory::Server => tracing::error!(code, %error, "resolver misbehaved"),
        ErrorCategory::Internal => {
            failfast_error!(code, %error, "query resolution failed");
        }
    }
}
