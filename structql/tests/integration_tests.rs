use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json_bytes::json;
use serde_json_bytes::Value;
use structql::configuration::Execution;
use structql::default_resolver;
use structql::middleware;
use structql::resolver;
use structql::schema::Property;
use structql::Configuration;
use structql::Context;
use structql::ContextKey;
use structql::Engine;
use structql::Error;
use structql::ErrorCategory;
use structql::Graph;
use structql::GraphNode;
use structql::Middleware;
use structql::Next;
use structql::Resolver;
use structql::Schema;
use structql::Structure;

type Trace = Arc<Mutex<Vec<String>>>;

fn schema() -> Schema {
    let member = Structure::interface(
        "Member",
        "Member",
        vec![],
        vec![
            Property::new("id", Structure::number("Member.id")),
            Property::new("name", Structure::string("Member.name")),
            Property::new("nickname", Structure::string("Member.nickname")).optional(),
        ],
    );
    let todo_item = Structure::interface(
        "TodoItem",
        "TodoItem",
        vec![],
        vec![Property::new("title", Structure::string("TodoItem.title"))],
    );
    let paginated = Structure::alias(
        "Paginated",
        "Paginated",
        vec!["T".to_string()],
        Structure::object(
            "Paginated.type",
            vec![
                Property::new(
                    "data",
                    Structure::array(
                        "Paginated.data",
                        Structure::reference("Paginated.data.items", "T", vec![]),
                    ),
                ),
                Property::new("total", Structure::number("Paginated.total")),
            ],
        ),
    );
    let cat = Structure::interface(
        "Cat",
        "Cat",
        vec![],
        vec![Property::new("meows", Structure::boolean("Cat.meows"))],
    );
    let dog = Structure::interface(
        "Dog",
        "Dog",
        vec![],
        vec![Property::new("barks", Structure::boolean("Dog.barks"))],
    );
    let graph = Structure::interface(
        "Graph",
        "Graph",
        vec![],
        vec![
            Property::new(
                "members",
                Structure::array(
                    "Graph.members",
                    Structure::reference("Graph.members.items", "Member", vec![]),
                ),
            ),
            Property::new(
                "featured",
                Structure::nullable(
                    "Graph.featured",
                    Structure::reference("Graph.featured.inner", "Member", vec![]),
                ),
            ),
            Property::new(
                "search",
                Structure::function(
                    "Graph.search",
                    vec![
                        Property::new("term", Structure::string("Graph.search.term")),
                        Property::new("limit", Structure::number("Graph.search.limit")).optional(),
                    ],
                    Structure::array(
                        "Graph.search.returns",
                        Structure::reference("Graph.search.returns.items", "Member", vec![]),
                    ),
                ),
            ),
            Property::new(
                "todos",
                Structure::reference(
                    "Graph.todos",
                    "Paginated",
                    vec![Structure::reference("Graph.todos.T", "TodoItem", vec![])],
                ),
            ),
            Property::new(
                "shape",
                Structure::union(
                    "Graph.shape",
                    vec![
                        Structure::object(
                            "Graph.shape.0",
                            vec![
                                Property::new("foo", Structure::string("Graph.shape.0.foo"))
                                    .optional(),
                            ],
                        ),
                        Structure::object(
                            "Graph.shape.1",
                            vec![
                                Property::new("bar", Structure::string("Graph.shape.1.bar"))
                                    .optional(),
                            ],
                        ),
                    ],
                ),
            ),
            Property::new(
                "pet",
                Structure::union(
                    "Graph.pet",
                    vec![
                        Structure::reference("Graph.pet.0", "Cat", vec![]),
                        Structure::reference("Graph.pet.1", "Dog", vec![]),
                    ],
                ),
            ),
            Property::new("version", Structure::number("Graph.version")),
        ],
    );
    Schema::new([
        ("Graph", graph),
        ("Member", member),
        ("TodoItem", todo_item),
        ("Paginated", paginated),
        ("Cat", cat),
        ("Dog", dog),
    ])
    .unwrap()
}

fn members(count: u64) -> Value {
    Value::Array(
        (1..=count)
            .map(|id| json!({"id": id, "name": format!("member-{id}"), "email": "hidden"}))
            .collect(),
    )
}

fn field<'a>(value: Option<&'a Value>, name: &str) -> Option<&'a Value> {
    value?.as_object()?.get(name)
}

fn at(graph: &Graph, path: &[&str]) -> GraphNode {
    graph.at(path).unwrap()
}

fn constant(value: Value) -> Middleware {
    middleware::resolve_with(move |_| {
        let value = value.clone();
        async move { Ok(Some(value)) }
    })
}

fn trace(log: &Trace, name: &'static str) -> Middleware {
    let log = log.clone();
    middleware::from_fn(move |context: Context, next: Next| {
        log.lock().push(name.to_string());
        next.run(context)
    })
}

fn engine(graph: &Graph, resolvers: Vec<Resolver>) -> Engine {
    Engine::builder()
        .graph(graph.clone())
        .entry("Graph")
        .resolvers(resolvers)
        .build()
        .unwrap()
}

/// The entry object and the members list, with `extra` resolvers registered after them.
fn members_engine(graph: &Graph, count: u64, extra: Vec<Resolver>) -> Engine {
    let mut resolvers = default_resolver([&at(graph, &["Graph"])]);
    resolvers.push(resolver(
        &at(graph, &["Graph", "members"]),
        [constant(members(count))],
    ));
    resolvers.extend(extra);
    engine(graph, resolvers)
}

#[test_log::test(tokio::test)]
async fn selects_a_page_of_members() {
    let graph = Graph::new(schema());
    let engine = members_engine(&graph, 3, vec![]);
    let data = engine
        .run(
            &json!([
                "Graph",
                "members",
                {"kind": "paginate", "page": 1, "pageSize": 2},
                {"kind": "select", "fields": {"id": [], "name": []}}
            ]),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(
        data,
        json!([{"id": 1, "name": "member-1"}, {"id": 2, "name": "member-2"}])
    );
}

#[tokio::test]
async fn paginates_one_indexed() {
    let graph = Graph::new(schema());
    let engine = members_engine(&graph, 12, vec![]);
    let data = engine
        .run(
            &json!([
                "Graph",
                "members",
                {"kind": "paginate", "page": 2, "pageSize": 5},
                "id"
            ]),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(data, json!([6, 7, 8, 9, 10]));

    let data = engine
        .run(
            &json!([
                "Graph",
                "members",
                {"kind": "paginate", "page": 4, "pageSize": 5},
                "id"
            ]),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(data, json!([]));
}

#[tokio::test]
async fn list_operations() {
    let graph = Graph::new(schema());
    let engine = members_engine(&graph, 3, vec![]);
    let run = |query: Value| {
        let engine = engine.clone();
        async move { engine.run(&query, &[]).await }
    };
    assert_eq!(
        run(json!(["Graph", "members", {"kind": "all"}, "id"]))
            .await
            .unwrap(),
        json!([1, 2, 3])
    );
    assert_eq!(
        run(json!(["Graph", "members", {"kind": "first"}, "name"]))
            .await
            .unwrap(),
        json!("member-1")
    );
    assert_eq!(
        run(json!(["Graph", "members", 2, "id"])).await.unwrap(),
        json!(3)
    );
    assert_eq!(
        run(json!(["Graph", "members"])).await.unwrap(),
        json!([
            {"id": 1, "name": "member-1", "email": "hidden"},
            {"id": 2, "name": "member-2", "email": "hidden"},
            {"id": 3, "name": "member-3", "email": "hidden"}
        ])
    );
    let error = run(json!(["Graph", "members", "id"])).await.unwrap_err();
    assert!(matches!(error, Error::InvalidQuery { key, .. } if key == "Graph.members"));
}

#[tokio::test]
async fn first_of_an_empty_list_is_null() {
    let graph = Graph::new(schema());
    let engine = members_engine(&graph, 0, vec![]);
    let data = engine
        .run(&json!(["Graph", "members", {"kind": "first"}, "id"]), &[])
        .await
        .unwrap();
    assert_eq!(data, Value::Null);
}

#[tokio::test]
async fn indexes_past_the_end_are_null() {
    let graph = Graph::new(schema());
    let engine = members_engine(&graph, 2, vec![]);
    let data = engine
        .run(&json!(["Graph", "members", 5, "id"]), &[])
        .await
        .unwrap();
    assert_eq!(data, Value::Null);
    let data = engine
        .run(&json!(["Graph", "members", 1, "id"]), &[])
        .await
        .unwrap();
    assert_eq!(data, json!(2));
}

#[test_log::test(tokio::test)]
async fn ancestors_run_before_descendants() {
    let graph = Graph::new(schema());
    let log = Trace::default();
    // registered leaf first on purpose
    let engine = members_engine(
        &graph,
        3,
        vec![
            resolver(&at(&graph, &["Member", "name"]), [trace(&log, "name")]),
            resolver(&at(&graph, &["Graph", "members"]), [trace(&log, "members")]),
            resolver(&at(&graph, &["Graph"]), [trace(&log, "graph")]),
        ],
    );
    let data = engine
        .run(&json!(["Graph", "members", {"kind": "all"}, "name"]), &[])
        .await
        .unwrap();
    assert_eq!(data, json!(["member-1", "member-2", "member-3"]));
    assert_eq!(
        *log.lock(),
        vec!["graph", "members", "name", "name", "name"]
    );
}

#[tokio::test]
async fn middlewares_on_one_node_nest_in_registration_order() {
    let graph = Graph::new(schema());
    let log = Trace::default();
    let wrap = |name: &'static str| {
        let log = log.clone();
        middleware::from_fn(move |context: Context, next: Next| {
            let log = log.clone();
            async move {
                log.lock().push(format!("enter {name}"));
                let context = next.run(context).await?;
                log.lock().push(format!("leave {name}"));
                Ok(context)
            }
        })
    };
    let members = at(&graph, &["Graph", "members"]);
    let engine = members_engine(
        &graph,
        1,
        vec![
            resolver(&members, [wrap("a"), wrap("b")]),
            resolver(&members, [wrap("c")]),
        ],
    );
    engine
        .run(&json!(["Graph", "members", {"kind": "all"}, "id"]), &[])
        .await
        .unwrap();
    assert_eq!(
        *log.lock(),
        vec!["enter a", "enter b", "enter c", "leave c", "leave b", "leave a"]
    );
}

#[tokio::test]
async fn generic_references_reach_the_bound_declaration() {
    let graph = Graph::new(schema());
    let todos = at(&graph, &["Graph", "todos"]);
    let shout = middleware::from_fn(|context: Context, next: Next| async move {
        let context = next.run(context).await?;
        let shouted = context.value().and_then(Value::as_str).map(str::to_uppercase);
        Ok(match shouted {
            Some(shouted) => context.with_value(shouted),
            None => context,
        })
    });
    let mut resolvers = default_resolver([&at(&graph, &["Graph"])]);
    resolvers.push(resolver(
        &todos,
        [constant(json!({
            "data": [{"title": "write"}, {"title": "ship"}],
            "total": 2
        }))],
    ));
    resolvers.push(resolver(&at(&graph, &["TodoItem", "title"]), [shout]));
    let engine = engine(&graph, resolvers);

    let data = engine
        .run(
            &json!(["Graph", "todos", "data", {"kind": "all"}, "title"]),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(data, json!(["WRITE", "SHIP"]));

    let total = engine
        .run(&json!(["Graph", "todos", "total"]), &[])
        .await
        .unwrap();
    assert_eq!(total, json!(2));
}

#[tokio::test]
async fn unions_pick_the_member_the_value_fits() {
    let graph = Graph::new(schema());
    let shape = at(&graph, &["Graph", "shape"]);
    let run = |value: Value| {
        let mut resolvers = default_resolver([&at(&graph, &["Graph"])]);
        resolvers.push(resolver(&shape, [constant(value)]));
        let engine = engine(&graph, resolvers);
        async move {
            engine
                .run(
                    &json!(["Graph", "shape", {"kind": "select", "fields": {"foo": []}}]),
                    &[],
                )
                .await
        }
    };

    assert_eq!(run(json!({"foo": "x"})).await.unwrap(), json!({"foo": "x"}));

    let error = run(json!({"bar": "y"})).await.unwrap_err();
    assert!(matches!(
        error,
        Error::UnknownProperty { key, prop } if key == "Graph.shape.1" && prop == "foo"
    ));

    let error = run(json!({})).await.unwrap_err();
    assert!(matches!(
        error,
        Error::AmbiguousUnionMatch { key, candidates, .. }
            if key == "Graph.shape" && candidates == "'Graph.shape.0', 'Graph.shape.1'"
    ));

    let error = run(json!({"baz": 1})).await.unwrap_err();
    assert!(matches!(
        error,
        Error::NoUnionMatch { key, received } if key == "Graph.shape" && received == r#"{"baz":1}"#
    ));
}

#[tokio::test]
async fn union_members_can_be_named_in_the_query() {
    let graph = Graph::new(schema());
    let mut resolvers = default_resolver([&at(&graph, &["Graph"])]);
    resolvers.push(resolver(
        &at(&graph, &["Graph", "pet"]),
        [constant(json!({"meows": true}))],
    ));
    let engine = engine(&graph, resolvers);

    let data = engine
        .run(&json!(["Graph", "pet", {"kind": "as", "type": "Cat"}, "meows"]), &[])
        .await
        .unwrap();
    assert_eq!(data, json!(true));

    let data = engine
        .run(&json!(["Graph", "pet", {"kind": "select", "fields": {"meows": []}}]), &[])
        .await
        .unwrap();
    assert_eq!(data, json!({"meows": true}));

    let error = engine
        .run(&json!(["Graph", "pet", {"kind": "as", "type": "Bird"}]), &[])
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        Error::InvalidUnionHint { key, hint } if key == "Graph.pet" && hint == "Bird"
    ));
}

#[tokio::test]
async fn null_short_circuits_nullable_nodes() {
    let graph = Graph::new(schema());
    let log = Trace::default();
    let run = |value: Value| {
        let mut resolvers = default_resolver([&at(&graph, &["Graph"])]);
        resolvers.push(resolver(
            &at(&graph, &["Graph", "featured"]),
            [constant(value)],
        ));
        resolvers.push(resolver(&at(&graph, &["Member"]), [trace(&log, "member")]));
        let engine = engine(&graph, resolvers);
        async move {
            engine
                .run(
                    &json!(["Graph", "featured", {"kind": "select", "fields": {"name": []}}]),
                    &[],
                )
                .await
                .unwrap()
        }
    };

    assert_eq!(run(Value::Null).await, Value::Null);
    assert!(log.lock().is_empty());

    assert_eq!(
        run(json!({"id": 7, "name": "ada"})).await,
        json!({"name": "ada"})
    );
    assert_eq!(*log.lock(), vec!["member"]);
}

#[tokio::test]
async fn objects_need_a_value_or_a_default() {
    let graph = Graph::new(schema());

    let error = engine(&graph, vec![])
        .run(&json!(["Graph"]), &[])
        .await
        .unwrap_err();
    assert!(matches!(&error, Error::CouldNotResolve { key } if key == "Graph"));
    assert_eq!(error.category(), ErrorCategory::Internal);

    let engine = engine(&graph, default_resolver([&at(&graph, &["Graph"])]));
    assert_eq!(engine.run(&json!(["Graph"]), &[]).await.unwrap(), json!({}));

    // the default only covers the node it was registered on
    let error = engine
        .run(&json!(["Graph", "version"]), &[])
        .await
        .unwrap_err();
    assert!(matches!(error, Error::CouldNotResolve { key } if key == "Graph.version"));
}

#[tokio::test]
async fn lists_default_to_empty() {
    let graph = Graph::new(schema());
    let engine = engine(
        &graph,
        default_resolver([&at(&graph, &["Graph"]), &at(&graph, &["Graph", "members"])]),
    );
    let data = engine
        .run(&json!(["Graph", "members", {"kind": "all"}, "id"]), &[])
        .await
        .unwrap();
    assert_eq!(data, json!([]));
}

#[tokio::test]
async fn resolved_values_are_checked() {
    let graph = Graph::new(schema());
    let mut resolvers = default_resolver([&at(&graph, &["Graph"])]);
    resolvers.push(resolver(
        &at(&graph, &["Graph", "version"]),
        [constant(json!("three"))],
    ));
    let error = engine(&graph, resolvers)
        .run(&json!(["Graph", "version"]), &[])
        .await
        .unwrap_err();
    assert!(matches!(
        &error,
        Error::InvalidResolvedValue { key, expected, received }
            if key == "Graph.version" && expected == "number" && received == r#""three""#
    ));
    assert_eq!(error.category(), ErrorCategory::Server);
}

#[tokio::test]
async fn undefined_optional_properties_are_left_out() {
    let graph = Graph::new(schema());
    let mut resolvers = default_resolver([&at(&graph, &["Graph"])]);
    resolvers.push(resolver(
        &at(&graph, &["Graph", "members"]),
        [constant(json!([
            {"id": 1, "name": "ada", "nickname": "countess"},
            {"id": 2, "name": "grace"}
        ]))],
    ));
    let data = engine(&graph, resolvers)
        .run(
            &json!([
                "Graph",
                "members",
                {"kind": "all"},
                {"kind": "select", "fields": {"name": [], "nickname": []}}
            ]),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(
        data,
        json!([{"name": "ada", "nickname": "countess"}, {"name": "grace"}])
    );
}

fn search_engine(graph: &Graph) -> Engine {
    let search = middleware::resolve_with(|context: Context| async move {
        let node = context.node()?;
        let input = context.input(node);
        let term = field(input, "term")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let limit = field(input, "limit")
            .and_then(Value::as_u64)
            .unwrap_or(u64::MAX);
        let Value::Array(all) = members(12) else {
            return Ok(None);
        };
        let found: Vec<Value> = all
            .into_iter()
            .filter(|member| {
                field(Some(member), "name")
                    .and_then(Value::as_str)
                    .is_some_and(|name| name.ends_with(&term))
            })
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();
        Ok(Some(Value::Array(found)))
    });
    let mut resolvers = default_resolver([&at(graph, &["Graph"])]);
    resolvers.push(resolver(&at(graph, &["Graph", "search"]), [search]));
    engine(graph, resolvers)
}

#[test_log::test(tokio::test)]
async fn calls_pass_their_arguments_as_input() {
    let graph = Graph::new(schema());
    let engine = search_engine(&graph);

    let data = engine
        .run(
            &json!([
                "Graph",
                "search",
                {"kind": "call", "args": {"term": "1"}},
                {"kind": "all"},
                "id"
            ]),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(data, json!([1, 11]));

    let data = engine
        .run(
            &json!([
                "Graph",
                "search",
                {"kind": "call", "args": {"term": {"kind": "variable", "index": 0}, "limit": 1}},
                {"kind": "all"},
                "id"
            ]),
            &[json!("2")],
        )
        .await
        .unwrap();
    assert_eq!(data, json!([2]));
}

#[tokio::test]
async fn calls_are_checked_before_running() {
    let graph = Graph::new(schema());
    let engine = search_engine(&graph);

    let error = engine
        .run(
            &json!(["Graph", "search", {"kind": "call", "args": {"limit": 1}}]),
            &[],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        &error,
        Error::InvalidArguments { key, reason, .. }
            if key == "Graph.search" && reason == "missing required argument 'term'"
    ));
    assert_eq!(error.category(), ErrorCategory::Client);

    let error = engine
        .run(
            &json!(["Graph", "search", {"kind": "call", "args": {"term": 1}}]),
            &[],
        )
        .await
        .unwrap_err();
    assert!(matches!(error, Error::InvalidArguments { .. }));

    let error = engine
        .run(&json!(["Graph", "search", {"kind": "all"}]), &[])
        .await
        .unwrap_err();
    assert!(matches!(error, Error::InvalidQuery { key, .. } if key == "Graph.search"));
}

#[tokio::test]
async fn resolvers_may_paginate_themselves() {
    let graph = Graph::new(schema());
    let members_node = at(&graph, &["Graph", "members"]);
    let sliced = middleware::from_fn(|context: Context, next: Next| async move {
        let node = context.node()?.clone();
        let input = context.input(&node);
        let page = field(input, "page").and_then(Value::as_u64).unwrap_or(1);
        let page_size = field(input, "pageSize")
            .and_then(Value::as_u64)
            .unwrap_or(12);
        let Value::Array(all) = members(12) else {
            return next.run(context).await;
        };
        let page: Vec<Value> = all
            .into_iter()
            .skip(((page - 1) * page_size) as usize)
            .take(page_size as usize)
            .collect();
        next.run(context.with_paginated_value(page)?).await
    });
    let mut resolvers = default_resolver([&at(&graph, &["Graph"])]);
    resolvers.push(resolver(&members_node, [sliced]));
    let data = engine(&graph, resolvers)
        .run(
            &json!([
                "Graph",
                "members",
                {"kind": "paginate", "page": 2, "pageSize": 5},
                "id"
            ]),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(data, json!([6, 7, 8, 9, 10]));
}

#[tokio::test]
async fn page_sizes_can_be_capped() {
    let graph = Graph::new(schema());
    let mut resolvers = default_resolver([&at(&graph, &["Graph"])]);
    resolvers.push(resolver(
        &at(&graph, &["Graph", "members"]),
        [constant(members(3))],
    ));
    let engine = Engine::builder()
        .graph(graph.clone())
        .entry("Graph")
        .resolvers(resolvers)
        .configuration(Configuration {
            execution: Execution::builder().max_page_size(10).build(),
        })
        .build()
        .unwrap();
    let error = engine
        .run(
            &json!(["Graph", "members", {"kind": "paginate", "page": 1, "pageSize": 11}]),
            &[],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        Error::InvalidQuery { reason, .. } if reason == "'pageSize' may not exceed 10"
    ));
}

#[tokio::test]
async fn paths_restart_at_the_entry() {
    let graph = Graph::new(schema());
    let mut resolvers = default_resolver([&at(&graph, &["Graph"])]);
    resolvers.push(resolver(
        &at(&graph, &["Graph", "members"]),
        [constant(members(2))],
    ));
    resolvers.push(resolver(
        &at(&graph, &["Graph", "version"]),
        [constant(json!(3))],
    ));
    let engine = engine(&graph, resolvers);

    let data = engine
        .run(
            &json!([
                "Graph",
                "members",
                {"kind": "first"},
                "name",
                {"kind": "path", "path": ["Graph", "version"]}
            ]),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(data, json!(3));

    let error = engine
        .run(
            &json!(["Graph", "members", {"kind": "path", "path": ["Other"]}]),
            &[],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        Error::InvalidEntry { expected, received } if expected == "Graph" && received == r#""Other""#
    ));
}

#[tokio::test]
async fn queries_start_at_the_entry() {
    let graph = Graph::new(schema());
    let engine = engine(&graph, default_resolver([&at(&graph, &["Graph"])]));

    let error = engine.run(&json!(["Member"]), &[]).await.unwrap_err();
    assert!(matches!(
        &error,
        Error::InvalidEntry { expected, received } if expected == "Graph" && received == r#""Member""#
    ));
    assert_eq!(error.category(), ErrorCategory::Client);

    let error = engine.run(&json!([]), &[]).await.unwrap_err();
    assert!(matches!(error, Error::InvalidEntry { received, .. } if received == "[]"));

    let error = engine.run(&json!("Graph"), &[]).await.unwrap_err();
    assert!(matches!(error, Error::InvalidQuery { .. }));
}

#[tokio::test]
async fn parallel_execution_keeps_query_order() {
    let graph = Graph::new(schema());
    let query = json!([
        "Graph",
        "members",
        {"kind": "paginate", "page": 1, "pageSize": 8},
        {"kind": "select", "fields": {"name": [], "id": []}}
    ]);
    let build = |parallel: bool| {
        let mut resolvers = default_resolver([&at(&graph, &["Graph"])]);
        resolvers.push(resolver(
            &at(&graph, &["Graph", "members"]),
            [constant(members(10))],
        ));
        // later items finish first
        resolvers.push(resolver(
            &at(&graph, &["Member"]),
            [middleware::from_fn(|context: Context, next: Next| async move {
                let id = field(context.value(), "id")
                    .and_then(Value::as_u64)
                    .unwrap_or_default();
                tokio::time::sleep(std::time::Duration::from_millis(20 - id)).await;
                next.run(context).await
            })],
        ));
        Engine::builder()
            .graph(graph.clone())
            .entry("Graph")
            .resolvers(resolvers)
            .configuration(Configuration {
                execution: Execution::builder().parallel(parallel).build(),
            })
            .build()
            .unwrap()
    };
    let sequential = build(false).run(&query, &[]).await.unwrap();
    let parallel = build(true).run(&query, &[]).await.unwrap();
    assert_eq!(sequential, parallel);
    assert_eq!(
        parallel.as_array().and_then(|page| page.first()),
        Some(&json!({"name": "member-1", "id": 1}))
    );
}

#[tokio::test]
async fn compilation_depth_is_limited() {
    let graph = Graph::new(schema());
    let engine = Engine::builder()
        .graph(graph.clone())
        .entry("Graph")
        .resolvers(default_resolver([&at(&graph, &["Graph"])]))
        .configuration(Configuration {
            execution: Execution::builder().recursion_limit(3).build(),
        })
        .build()
        .unwrap();
    let error = engine
        .run(&json!(["Graph", "members", {"kind": "all"}, "id"]), &[])
        .await
        .unwrap_err();
    assert!(matches!(error, Error::RecursionLimitExceeded { limit: 3 }));
    assert_eq!(error.category(), ErrorCategory::Client);
}

#[test]
fn invalid_configuration_is_rejected_when_building() {
    let graph = Graph::new(schema());
    let error = Engine::builder()
        .graph(graph.clone())
        .entry("Graph")
        .resolvers(default_resolver([&at(&graph, &["Graph"])]))
        .configuration(Configuration {
            execution: Execution::builder().recursion_limit(0).build(),
        })
        .build()
        .unwrap_err();
    assert!(matches!(error, Error::InvalidConfiguration(_)));
    assert_eq!(error.category(), ErrorCategory::Internal);
    assert_eq!(error.extension_code(), "INVALID_CONFIGURATION");
}

struct Rows;

impl ContextKey for Rows {
    type Value = Value;
    const NAME: &'static str = "rows";
}

#[tokio::test]
async fn resolvers_share_host_data_through_the_context() {
    let graph = Graph::new(schema());
    let load = middleware::from_fn(|context: Context, next: Next| {
        next.run(context.push::<Rows>(members(2)))
    });
    let read = middleware::resolve_with(|context: Context| async move {
        Ok(Some(context.get_or_fail::<Rows>()?.clone()))
    });
    let members_node = at(&graph, &["Graph", "members"]);

    let mut resolvers = default_resolver([&at(&graph, &["Graph"])]);
    resolvers.push(resolver(&at(&graph, &["Graph"]), [load]));
    resolvers.push(resolver(&members_node, [read.clone()]));
    let data = engine(&graph, resolvers)
        .run(&json!(["Graph", "members", {"kind": "all"}, "id"]), &[])
        .await
        .unwrap();
    assert_eq!(data, json!([1, 2]));

    let mut resolvers = default_resolver([&at(&graph, &["Graph"])]);
    resolvers.push(resolver(&members_node, [read]));
    let error = engine(&graph, resolvers)
        .run(&json!(["Graph", "members"]), &[])
        .await
        .unwrap_err();
    assert!(matches!(error, Error::MissingContextKey { key: "rows" }));

    let seeded = Context::new().push::<Rows>(members(1));
    let mut resolvers = default_resolver([&at(&graph, &["Graph"])]);
    resolvers.push(resolver(&members_node, [middleware::resolve_with(
        |context: Context| async move { Ok(context.get::<Rows>().cloned()) },
    )]));
    let data = engine(&graph, resolvers)
        .run_with_context(&json!(["Graph", "members", 0, "id"]), &[], seeded)
        .await
        .unwrap();
    assert_eq!(data, json!(1));
}

#[tokio::test]
async fn short_circuiting_resolvers_skip_the_descent() {
    let graph = Graph::new(schema());
    let log = Trace::default();
    let members_node = at(&graph, &["Graph", "members"]);
    let canned = middleware::from_fn(|context: Context, _next: Next| {
        async move { Ok(context.with_value(json!(["canned"]))) }.boxed()
    });
    let mut resolvers = default_resolver([&at(&graph, &["Graph"])]);
    resolvers.push(resolver(&members_node, [canned]));
    resolvers.push(resolver(&at(&graph, &["Member"]), [trace(&log, "member")]));
    let data = engine(&graph, resolvers)
        .run(&json!(["Graph", "members", {"kind": "all"}, "id"]), &[])
        .await
        .unwrap();
    assert_eq!(data, json!(["canned"]));
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn resolvers_must_belong_to_the_engine_graph() {
    let graph = Graph::new(schema());
    let other = Graph::new(schema());
    let error = Engine::builder()
        .graph(graph.clone())
        .entry("Graph")
        .resolvers(default_resolver([&at(&other, &["Graph"])]))
        .build()
        .unwrap_err();
    assert!(matches!(error, Error::InvalidResolverPath { key } if key == "Graph"));

    let error = Engine::builder()
        .graph(graph)
        .entry("Nowhere")
        .build()
        .unwrap_err();
    assert!(matches!(error, Error::InvalidSchema { .. }));
}

const SCHEMA: &str = r#"{
    "entries": {
        "Graph": {
            "kind": "object",
            "key": "Graph",
            "name": "Graph",
            "properties": [
                {
                    "name": "tags",
                    "structure": {
                        "kind": "array",
                        "key": "Graph.tags",
                        "items": {
                            "kind": "union",
                            "key": "Graph.tags.items",
                            "members": [
                                { "kind": "literal", "key": "Graph.tags.items.0", "value": "red" },
                                { "kind": "literal", "key": "Graph.tags.items.1", "value": "blue" }
                            ]
                        }
                    }
                }
            ]
        }
    }
}"#;

#[tokio::test]
async fn schemas_load_from_json() {
    let graph = Graph::new(Schema::from_json(SCHEMA).unwrap());
    let run = |tags: Value| {
        let mut resolvers = default_resolver([&at(&graph, &["Graph"])]);
        resolvers.push(resolver(&at(&graph, &["Graph", "tags"]), [constant(tags)]));
        let engine = engine(&graph, resolvers);
        async move { engine.run(&json!(["Graph", "tags"]), &[]).await }
    };
    assert_eq!(
        run(json!(["red", "blue", "red"])).await.unwrap(),
        json!(["red", "blue", "red"])
    );
    let error = run(json!(["green"])).await.unwrap_err();
    assert!(matches!(error, Error::NoUnionMatch { key, .. } if key == "Graph.tags.items"));
}
