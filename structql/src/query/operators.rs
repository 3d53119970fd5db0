//! Operators recognize the head of a query definition and compile it into middleware.
//!
//! Operators are tried in order, host operators first, before the compiler falls back to the
//! default behaviour of the structure at hand. They only ever see value shaped nodes: references,
//! aliases and nullables have already been stepped through.

use std::sync::Arc;

use futures::future::try_join_all;
use futures::FutureExt;
use serde_json_bytes::ByteString;

use super::compiler::output;
use super::instruction_fields;
use super::instruction_kind;
use super::query_field;
use super::Compiler;
use crate::context::Context;
use crate::context::Parent;
use crate::error::Error;
use crate::graph::GraphNode;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::middleware::Middleware;
use crate::middleware::Next;
use crate::schema::Structure;

/// A query instruction recognizer.
pub trait Operator: Send + Sync {
    /// The `kind` this operator handles, for diagnostics.
    fn kind(&self) -> &'static str;

    /// Compiles `query` at `node`, or returns `Ok(None)` if the head of `query` is not for this
    /// operator.
    fn compile(
        &self,
        compiler: &Compiler,
        node: &GraphNode,
        query: &[Value],
    ) -> Result<Option<Middleware>, Error>;
}

pub(crate) fn builtin_operators() -> Vec<Arc<dyn Operator>> {
    vec![Arc::new(PathOperator), Arc::new(SelectOperator)]
}

/// `{"kind": "path", "path": [...], "query": [...]}`: restarts navigation at the root.
///
/// The current value is ignored; the path must start at the engine's entry.
struct PathOperator;

impl Operator for PathOperator {
    fn kind(&self) -> &'static str {
        "path"
    }

    fn compile(
        &self,
        compiler: &Compiler,
        node: &GraphNode,
        query: &[Value],
    ) -> Result<Option<Middleware>, Error> {
        let Some((head, rest)) = query.split_first() else {
            return Ok(None);
        };
        if instruction_kind(head) != Some(self.kind()) {
            return Ok(None);
        }
        last_instruction(node, head, rest)?;
        let path = query_field(node.key(), head, "path")?.ok_or_else(|| {
            Error::invalid_query(node.key(), head.to_json_text(), "'path' is required")
        })?;
        let nested = query_field(node.key(), head, "query")?.unwrap_or_default();
        let absolute: Vec<Value> = path.iter().chain(nested).cloned().collect();

        let root = compiler.graph().root();
        let inner = compiler.optional(false).compile(&root, &absolute)?;
        Ok(Some(Arc::new(move |context: Context, next: Next| {
            let inner = inner.clone();
            async move {
                let value = output(&inner, context.without_value()).await?;
                next.run(context.with_optional_value(value)).await
            }
            .boxed()
        })))
    }
}

/// `{"kind": "select", "fields": {"name": [...]}}`: projects an object.
///
/// Each field is resolved with its own query. The result keeps the requested order and leaves
/// out optional properties that stayed undefined.
struct SelectOperator;

impl Operator for SelectOperator {
    fn kind(&self) -> &'static str {
        "select"
    }

    fn compile(
        &self,
        compiler: &Compiler,
        node: &GraphNode,
        query: &[Value],
    ) -> Result<Option<Middleware>, Error> {
        let Some((head, rest)) = query.split_first() else {
            return Ok(None);
        };
        if instruction_kind(head) != Some(self.kind()) {
            return Ok(None);
        }
        // anything else reports the instruction through its default compiler
        let Structure::Object(object) = node.structure().as_ref() else {
            return Ok(None);
        };
        last_instruction(node, head, rest)?;
        let Some(Value::Object(requested)) =
            instruction_fields(head).and_then(|fields| fields.get("fields"))
        else {
            return Err(Error::invalid_query(
                node.key(),
                head.to_json_text(),
                "'fields' must map property names to queries",
            ));
        };

        let mut fields = Vec::with_capacity(requested.len());
        for (name, sub_query) in requested.iter() {
            let Value::Array(sub_query) = sub_query else {
                return Err(Error::invalid_query(
                    node.key(),
                    head.to_json_text(),
                    format!("the query for '{}' must be a list", name.as_str()),
                ));
            };
            let optional = object
                .property(name.as_str())
                .is_some_and(|property| property.optional);
            let child = node.get(name.as_str())?;
            let inner = compiler.optional(optional).compile(&child, sub_query)?;
            fields.push((name.clone(), inner));
        }
        let fields: Arc<[(ByteString, Middleware)]> = fields.into();
        let parallel = compiler.execution().parallel;

        let descend = compiler.settled(node, move |context, value| {
            let fields = fields.clone();
            async move {
                let Value::Object(object) = &value else {
                    return Ok(Some(value));
                };
                let context = context.push::<Parent>(value.clone());
                let runs = fields.iter().map(|(name, inner)| {
                    output(
                        inner,
                        context.with_optional_value(object.get(name.as_str()).cloned()),
                    )
                });
                let values = if parallel {
                    try_join_all(runs).await?
                } else {
                    let mut values = Vec::with_capacity(fields.len());
                    for run in runs {
                        values.push(run.await?);
                    }
                    values
                };
                let mut selected = Object::new();
                for ((name, _), value) in fields.iter().zip(values) {
                    if let Some(value) = value {
                        selected.insert(name.clone(), value);
                    }
                }
                Ok(Some(Value::Object(selected)))
            }
        });
        Ok(Some(compiler.resolve(node, None, descend)))
    }
}

fn last_instruction(node: &GraphNode, head: &Value, rest: &[Value]) -> Result<(), Error> {
    match rest.first() {
        None => Ok(()),
        Some(next) => Err(Error::invalid_query(
            node.key(),
            next.to_json_text(),
            format!(
                "'{}' must be the last instruction",
                instruction_kind(head).unwrap_or_default()
            ),
        )),
    }
}
