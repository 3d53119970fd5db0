use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::try_join_all;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json_bytes::ByteString;

use super::instruction_fields;
use super::instruction_kind;
use super::positive_field;
use super::Operator;
use crate::configuration::Execution;
use crate::context::Context;
use crate::context::Index;
use crate::context::Input;
use crate::context::Paginated;
use crate::context::Parent;
use crate::context::UseDefault;
use crate::error::Error;
use crate::graph::Graph;
use crate::graph::GraphNode;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::middleware::compose;
use crate::middleware::drain;
use crate::middleware::Middleware;
use crate::middleware::Next;
use crate::registry::Registry;
use crate::schema::PrimitiveKind;
use crate::schema::Structure;
use crate::union_matcher::check_arguments;
use crate::union_matcher::match_member;

/// Produces the output of a node once its resolvers have run.
///
/// Receives the context left by the resolver chain and returns the node's value, `None` meaning
/// undefined.
pub type Descend =
    Arc<dyn Fn(Context) -> BoxFuture<'static, Result<Option<Value>, Error>> + Send + Sync>;

struct Shared {
    graph: Graph,
    entry: String,
    registry: Registry,
    operators: Vec<Arc<dyn Operator>>,
    execution: Execution,
}

/// Turns query definitions into middleware.
///
/// A compiler is positioned: it tracks how deep in the query it is and whether the node being
/// compiled may stay undefined. Operators get the compiler for their position and derive the
/// compilers of child positions from it.
#[derive(Clone)]
pub struct Compiler {
    shared: Arc<Shared>,
    depth: usize,
    optional: bool,
}

enum ListOperation {
    All,
    First,
    At(usize),
    Paginate { page: usize, page_size: usize },
}

impl Compiler {
    pub(crate) fn new(
        graph: Graph,
        entry: String,
        registry: Registry,
        operators: Vec<Arc<dyn Operator>>,
        execution: Execution,
    ) -> Self {
        Compiler {
            shared: Arc::new(Shared {
                graph,
                entry,
                registry,
                operators,
                execution,
            }),
            depth: 0,
            optional: false,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.shared.graph
    }

    pub fn entry(&self) -> &str {
        &self.shared.entry
    }

    pub fn execution(&self) -> &Execution {
        &self.shared.execution
    }

    /// Whether the node at this position may stay undefined.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// The compiler for a position that may, or may not, stay undefined.
    pub fn optional(&self, optional: bool) -> Compiler {
        Compiler {
            optional,
            ..self.clone()
        }
    }

    fn descend(&self) -> Result<Compiler, Error> {
        let limit = self.shared.execution.recursion_limit;
        if self.depth >= limit {
            return Err(Error::RecursionLimitExceeded { limit });
        }
        Ok(Compiler {
            depth: self.depth + 1,
            ..self.clone()
        })
    }

    /// Compiles a whole query, starting at the root.
    #[tracing::instrument(level = "debug", skip_all, fields(entry = %self.entry()))]
    pub(crate) fn compile_query(&self, query: &[Value]) -> Result<Middleware, Error> {
        self.compile(&self.graph().root(), query)
    }

    /// Compiles `query` against `node`.
    ///
    /// Operators are tried first, then the default behaviour of the node's structure.
    pub fn compile(&self, node: &GraphNode, query: &[Value]) -> Result<Middleware, Error> {
        let this = self.descend()?;
        tracing::trace!(key = node.key(), kind = %node.kind(), depth = this.depth, "compiling");
        if !matches!(
            node.structure().as_ref(),
            Structure::Ref(_) | Structure::Alias(_) | Structure::Nullable(_)
        ) {
            for operator in &this.shared.operators {
                if let Some(middleware) = operator.compile(&this, node, query)? {
                    return Ok(middleware);
                }
            }
        }
        this.compile_default(node, query)
    }

    fn compile_default(&self, node: &GraphNode, query: &[Value]) -> Result<Middleware, Error> {
        match node.structure().as_ref() {
            Structure::Root(_) => self.compile_root(node, query),
            Structure::Ref(_) => self.forward(node, None, node.target()?, query),
            Structure::Alias(_) => self.forward(node, None, node.body()?, query),
            Structure::Nullable(_) => self.forward(node, None, node.inner()?, query),
            Structure::Object(_) => self.compile_object(node, query),
            Structure::Array(_) => self.compile_array(node, query),
            Structure::Function(_) => self.compile_function(node, query),
            Structure::Union(_) => self.compile_union(node, query),
            Structure::Primitive(_) | Structure::Literal(_) => self.compile_leaf(node, query),
            Structure::Arguments(_) => Err(Error::invalid_query(
                node.key(),
                Value::Array(query.to_vec()).to_json_text(),
                "argument lists are not queried directly, use 'call'",
            )),
        }
    }

    /// Builds the middleware of `node`: pushes the node and its input, runs the resolvers
    /// registered on it, then `descend` as the innermost step of their chain.
    pub fn resolve(&self, node: &GraphNode, input: Option<Value>, descend: Descend) -> Middleware {
        let resolvers = compose(self.shared.registry.middlewares_for(node));
        let node = node.clone();
        Arc::new(move |context: Context, next: Next| {
            let mut context = context.with_node(&node);
            if let Some(input) = &input {
                context = context.push_scoped::<Input>(&node, input.clone());
            }
            let descend = descend.clone();
            let terminal = Next::new(move |context: Context| async move {
                let value = descend(context.clone()).await?;
                Ok(context.with_optional_value(value))
            });
            let chain = resolvers(context, terminal);
            async move { next.run(chain.await?).await }.boxed()
        })
    }

    /// A [`Descend`] that settles the value left for `node` before handing it to `f`.
    ///
    /// Settling applies a registered default, lets an optional node stay undefined and checks
    /// that the value fits the node's structure.
    pub fn settled<F, Fut>(&self, node: &GraphNode, f: F) -> Descend
    where
        F: Fn(Context, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, Error>> + Send + 'static,
    {
        let node = node.clone();
        let optional = self.optional;
        let f = Arc::new(f);
        Arc::new(move |context: Context| {
            let settled = settle(&context, &node, optional);
            let f = f.clone();
            async move {
                match settled? {
                    Some(value) => f(context, value).await,
                    None => Ok(None),
                }
            }
            .boxed()
        })
    }

    /// Compiles `query` against `child` and runs it as the descent of `node`.
    ///
    /// Used for structures that only wrap another one. A nullable left with `null` does not
    /// descend.
    fn forward(
        &self,
        node: &GraphNode,
        input: Option<Value>,
        child: GraphNode,
        query: &[Value],
    ) -> Result<Middleware, Error> {
        let inner = self.compile(&child, query)?;
        let from = node.clone();
        let nullable = matches!(node.structure().as_ref(), Structure::Nullable(_));
        Ok(self.resolve(
            node,
            input,
            Arc::new(move |context: Context| {
                if nullable && context.value() == Some(&Value::Null) {
                    return async { Ok(Some(Value::Null)) }.boxed();
                }
                output(&inner, inherit_markers(context, &from, &child))
            }),
        ))
    }

    fn compile_root(&self, node: &GraphNode, query: &[Value]) -> Result<Middleware, Error> {
        let entry = self.entry();
        let received = match query.split_first() {
            Some((Value::String(name), rest)) if name.as_str() == entry => {
                return self.forward(node, None, node.get(entry)?, rest);
            }
            Some((head, _)) => head.to_json_text(),
            None => "[]".to_string(),
        };
        Err(Error::InvalidEntry {
            expected: entry.to_string(),
            received,
        })
    }

    fn compile_object(&self, node: &GraphNode, query: &[Value]) -> Result<Middleware, Error> {
        let Some((head, rest)) = query.split_first() else {
            return Ok(self.resolve(node, None, self.settled(node, identity)));
        };
        let Value::String(name) = head else {
            return Err(self.unknown_instruction(node, head));
        };
        let optional = match node.structure().as_ref() {
            Structure::Object(object) => object
                .property(name.as_str())
                .is_some_and(|property| property.optional),
            _ => false,
        };
        let child = node.get(name.as_str())?;
        let inner = self.optional(optional).compile(&child, rest)?;
        let name = name.clone();
        let descend = self.settled(node, move |context, value| {
            let field = match &value {
                Value::Object(object) => object.get(name.as_str()).cloned(),
                _ => None,
            };
            output(
                &inner,
                context.push::<Parent>(value).with_optional_value(field),
            )
        });
        Ok(self.resolve(node, None, descend))
    }

    fn compile_array(&self, node: &GraphNode, query: &[Value]) -> Result<Middleware, Error> {
        let (operation, rest) = match query.split_first() {
            None => (ListOperation::All, query),
            Some((head @ Value::Number(_), rest)) => {
                let index = head
                    .as_u64()
                    .and_then(|index| usize::try_from(index).ok())
                    .ok_or_else(|| {
                        Error::invalid_query(
                            node.key(),
                            head.to_json_text(),
                            "list indexes must be non negative integers",
                        )
                    })?;
                (ListOperation::At(index), rest)
            }
            Some((head, rest)) => {
                let operation = match instruction_kind(head) {
                    Some("all") => ListOperation::All,
                    Some("first") => ListOperation::First,
                    Some("paginate") => self.paginate(node, head)?,
                    _ => return Err(self.unknown_instruction(node, head)),
                };
                (operation, rest)
            }
        };
        let input = match operation {
            ListOperation::Paginate { page, page_size } => {
                let mut input = Object::new();
                input.insert(ByteString::from("page"), Value::Number((page as u64).into()));
                input.insert(
                    ByteString::from("pageSize"),
                    Value::Number((page_size as u64).into()),
                );
                Some(Value::Object(input))
            }
            _ => None,
        };

        let items = node.items()?;
        let inner = self.optional(false).compile(&items, rest)?;
        let parallel = self.execution().parallel;
        let list = node.clone();
        let operation = Arc::new(operation);
        let descend = self.settled(node, move |context, value| {
            let inner = inner.clone();
            let operation = operation.clone();
            let paginated = context.is_paginated(&list);
            async move {
                let Value::Array(values) = &value else {
                    return Ok(Some(value));
                };
                let context = context.push::<Parent>(value.clone());
                let item = |index: usize, item: Option<Value>| {
                    output(
                        &inner,
                        context.push::<Index>(index).with_optional_value(item),
                    )
                };
                let (offset, count) = match *operation {
                    ListOperation::At(index) => match values.get(index) {
                        Some(value) => return item(index, Some(value.clone())).await,
                        None => return Ok(Some(Value::Null)),
                    },
                    ListOperation::First => match values.first() {
                        Some(first) => return item(0, Some(first.clone())).await,
                        None => return Ok(Some(Value::Null)),
                    },
                    ListOperation::All => (0, values.len()),
                    ListOperation::Paginate { .. } if paginated => (0, values.len()),
                    ListOperation::Paginate { page, page_size } => {
                        ((page - 1).saturating_mul(page_size), page_size)
                    }
                };
                let runs = values
                    .iter()
                    .enumerate()
                    .skip(offset)
                    .take(count)
                    .map(|(index, value)| item(index, Some(value.clone())));
                let resolved = if parallel {
                    try_join_all(runs).await?
                } else {
                    let mut resolved = Vec::new();
                    for run in runs {
                        resolved.push(run.await?);
                    }
                    resolved
                };
                Ok(Some(Value::Array(
                    resolved
                        .into_iter()
                        .map(|value| value.unwrap_or(Value::Null))
                        .collect(),
                )))
            }
        });
        Ok(self.resolve(node, input, descend))
    }

    fn paginate(&self, node: &GraphNode, instruction: &Value) -> Result<ListOperation, Error> {
        let page = positive_field(node.key(), instruction, "page")?;
        let page_size = positive_field(node.key(), instruction, "pageSize")?;
        if let Some(max) = self.execution().max_page_size {
            if page_size > max {
                return Err(Error::invalid_query(
                    node.key(),
                    instruction.to_json_text(),
                    format!("'pageSize' may not exceed {max}"),
                ));
            }
        }
        Ok(ListOperation::Paginate { page, page_size })
    }

    fn compile_function(&self, node: &GraphNode, query: &[Value]) -> Result<Middleware, Error> {
        let (head, rest) = match query.split_first() {
            Some((head, rest)) if instruction_kind(head) == Some("call") => (head, rest),
            Some((head, _)) => {
                return Err(Error::invalid_query(
                    node.key(),
                    head.to_json_text(),
                    "functions must be called before anything else",
                ))
            }
            None => {
                return Err(Error::invalid_query(
                    node.key(),
                    "[]",
                    "functions must be called",
                ))
            }
        };
        let args = instruction_fields(head)
            .and_then(|fields| fields.get("args"))
            .cloned()
            .unwrap_or_else(|| Value::Object(Object::new()));
        check_arguments(node, &args)?;
        self.forward(node, Some(args), node.returns()?, rest)
    }

    fn compile_union(&self, node: &GraphNode, query: &[Value]) -> Result<Middleware, Error> {
        if let Some((head, rest)) = query.split_first() {
            if instruction_kind(head) == Some("as") {
                let hint = instruction_fields(head)
                    .and_then(|fields| fields.get("type"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::invalid_query(
                            node.key(),
                            head.to_json_text(),
                            "'type' must name a member of the union",
                        )
                    })?;
                let member = match_member(node, None, Some(hint))?;
                return self.forward(node, None, member, rest);
            }
        }

        // the member depends on the resolved value, so it is compiled at run time
        let union = node.clone();
        let compiler = self.clone();
        let query: Arc<[Value]> = query.into();
        let descend = self.settled(node, move |context, value| {
            let compiled = match_member(&union, Some(&value), None)
                .and_then(|member| compiler.compile(&member, &query));
            async move { output(&compiled?, context.with_value(value)).await }
        });
        Ok(self.resolve(node, None, descend))
    }

    fn compile_leaf(&self, node: &GraphNode, query: &[Value]) -> Result<Middleware, Error> {
        if let Some(head) = query.first() {
            return Err(Error::invalid_query(
                node.key(),
                head.to_json_text(),
                format!("'{}' values take no further instructions", node.kind()),
            ));
        }
        Ok(self.resolve(node, None, self.settled(node, identity)))
    }

    fn unknown_instruction(&self, node: &GraphNode, head: &Value) -> Error {
        let reason = match instruction_kind(head) {
            Some(kind) => format!("unknown instruction '{kind}' for '{}'", node.kind()),
            None => format!("unexpected step for '{}'", node.kind()),
        };
        Error::invalid_query(node.key(), head.to_json_text(), reason)
    }
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("entry", &self.shared.entry)
            .field("operators", &self.shared.operators.len())
            .field("registry", &self.shared.registry)
            .field("depth", &self.depth)
            .field("optional", &self.optional)
            .finish()
    }
}

async fn identity(_context: Context, value: Value) -> Result<Option<Value>, Error> {
    Ok(Some(value))
}

/// Drains `middleware` and returns the value it left.
pub(crate) fn output(
    middleware: &Middleware,
    context: Context,
) -> BoxFuture<'static, Result<Option<Value>, Error>> {
    let drained = drain(middleware, context);
    async move { Ok(drained.await?.value().cloned()) }.boxed()
}

/// Carries the markers set by resolvers on a wrapping node over to the wrapped one.
fn inherit_markers(mut context: Context, from: &GraphNode, to: &GraphNode) -> Context {
    if context.get_scoped::<UseDefault>(from).is_some() {
        context = context.push_scoped::<UseDefault>(to, ());
    }
    if context.is_paginated(from) {
        context = context.push_scoped::<Paginated>(to, ());
    }
    context
}

/// The value the resolver chain left for `node`.
///
/// `None` when it is undefined and `optional` allows it.
fn settle(context: &Context, node: &GraphNode, optional: bool) -> Result<Option<Value>, Error> {
    let value = match context.value() {
        Some(value) => value.clone(),
        None => match (node.structure().as_ref(), context.get_scoped::<UseDefault>(node)) {
            (Structure::Object(_), Some(())) => Value::Object(Object::new()),
            (Structure::Array(_), Some(())) => Value::Array(Vec::new()),
            _ if optional => return Ok(None),
            _ => {
                return Err(Error::CouldNotResolve {
                    key: node.key().to_string(),
                })
            }
        },
    };
    check_resolved(node, &value)?;
    Ok(Some(value))
}

/// Checks that a resolved value fits the structure it was resolved for.
fn check_resolved(node: &GraphNode, value: &Value) -> Result<(), Error> {
    let expected = match node.structure().as_ref() {
        Structure::Object(_) if !value.is_object() => "object".to_string(),
        Structure::Array(_) if !value.is_array() => "array".to_string(),
        Structure::Primitive(primitive) => {
            let fits = matches!(
                (primitive.primitive, value),
                (PrimitiveKind::String, Value::String(_))
                    | (PrimitiveKind::Number, Value::Number(_))
                    | (PrimitiveKind::Boolean, Value::Bool(_))
            );
            if fits {
                return Ok(());
            }
            primitive.primitive.to_string()
        }
        Structure::Literal(literal) if literal.value != *value => literal.value.to_json_text(),
        _ => return Ok(()),
    };
    Err(Error::InvalidResolvedValue {
        key: node.key().to_string(),
        expected,
        received: value.to_json_text(),
    })
}
