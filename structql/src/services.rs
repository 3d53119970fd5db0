//! A [`tower::Service`] over [`Engine::run`], so hosts can put their own layers around it.

use std::task::Poll;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde::Serialize;
use tower::BoxError;
use tower::Service;

use crate::context::Context;
use crate::engine::Engine;
use crate::json_ext::Value;

/// A query and its positional variables.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub query: Value,
    #[serde(default)]
    pub variables: Vec<Value>,
    /// Host data every resolver sees.
    #[serde(skip)]
    pub context: Context,
}

#[buildstructor::buildstructor]
impl Request {
    #[builder(visibility = "pub")]
    fn new(query: Value, variables: Vec<Value>, context: Option<Context>) -> Self {
        Self {
            query,
            variables,
            context: context.unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub data: Value,
}

/// [`Service`] for query resolution.
///
/// Errors are [`crate::Error`]s boxed into a [`BoxError`].
#[derive(Clone, Debug)]
pub struct EngineService {
    engine: Engine,
}

impl EngineService {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }
}

impl From<Engine> for EngineService {
    fn from(engine: Engine) -> Self {
        Self::new(engine)
    }
}

impl Service<Request> for EngineService {
    type Response = Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let engine = self.engine.clone();
        Box::pin(async move {
            let data = engine
                .run_with_context(&request.query, &request.variables, request.context)
                .await?;
            Ok(Response { data })
        })
    }
}
