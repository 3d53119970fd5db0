//! Engine errors.
use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use thiserror::Error;
use tower::BoxError;

use crate::configuration::ConfigurationError;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// Errors raised while navigating the graph, compiling a query or draining a resolver chain.
///
/// A failure anywhere in a composed chain aborts the whole [`crate::Engine::run`] call with the
/// originating error. Use [`Error::category`] to decide what may be shown to a client.
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum Error {
    /// invalid query at '{key}': {reason} (received {received})
    InvalidQuery {
        /// Key of the node the instruction was compiled against.
        key: String,
        /// The instruction as received, in JSON.
        received: String,
        /// Why the instruction was rejected.
        reason: String,
    },

    /// queries must start at entry '{expected}', received {received}
    InvalidEntry {
        /// The entry the engine was created with.
        expected: String,
        /// The first step of the query, in JSON.
        received: String,
    },

    /// '{hint}' is not a member of union '{key}'
    InvalidUnionHint {
        /// Key of the union.
        key: String,
        /// The hint as received.
        hint: String,
    },

    /// no member of union '{key}' matches {received}; supply an explicit `as` hint
    NoUnionMatch {
        /// Key of the union.
        key: String,
        /// The value that was tested, in JSON.
        received: String,
    },

    /// members {candidates} of union '{key}' all match {received}; supply an explicit `as` hint
    AmbiguousUnionMatch {
        /// Key of the union.
        key: String,
        /// The value that was tested, in JSON.
        received: String,
        /// Keys of every matching member.
        candidates: String,
    },

    /// invalid arguments for '{key}': {reason} (received {received})
    InvalidArguments {
        /// Key of the function.
        key: String,
        /// The arguments as received, in JSON.
        received: String,
        /// What failed to validate.
        reason: String,
    },

    /// resolver for '{key}' produced {received} where {expected} was expected
    InvalidResolvedValue {
        /// Key of the node the value was resolved for.
        key: String,
        /// The expected shape.
        expected: String,
        /// The value that was produced, in JSON.
        received: String,
    },

    /// could not resolve reference '{target}' from '{key}': {reason}
    UnresolvedReference {
        /// Key of the reference.
        key: String,
        /// The declaration it points to.
        target: String,
        /// Why the reference could not be resolved.
        reason: String,
    },

    /// resolver registered on '{key}' is not reachable from this engine's root
    InvalidResolverPath {
        /// Key of the node the resolver was registered on.
        key: String,
    },

    /// unknown structure kind '{kind}'
    UnknownStructureKind {
        /// The kind tag as found in the schema.
        kind: String,
    },

    /// could not resolve a value for '{key}'
    CouldNotResolve {
        /// Key of the node left without a value.
        key: String,
    },

    /// '{member}' is not a member of union '{key}'
    InvalidUnionAccess {
        /// Key of the union.
        key: String,
        /// The member that was requested.
        member: String,
    },

    /// '{key}' has no properties, cannot access '{prop}'
    NoPropertiesOnLeaf {
        /// Key of the leaf.
        key: String,
        /// The property that was requested.
        prop: String,
    },

    /// '{key}' has no property '{prop}'
    UnknownProperty {
        /// Key of the node.
        key: String,
        /// The property that was requested.
        prop: String,
    },

    /// context has no value for '{key}'
    MissingContextKey {
        /// Name of the context key.
        key: &'static str,
    },

    /// query nesting exceeds the recursion limit of {limit}
    RecursionLimitExceeded {
        /// The configured limit.
        limit: usize,
    },

    /// invalid schema: {reason}
    InvalidSchema {
        /// Why the schema was rejected.
        reason: String,
    },

    /// invalid configuration: {0}
    InvalidConfiguration(#[from] ConfigurationError),

    /// resolver failed: {0}
    ResolverFailed(BoxError),
}

/// Who caused an [`Error`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    /// The query or its variables were wrong. Safe to show to the client.
    Client,
    /// A resolver misbehaved. Log it, do not leak the details.
    Server,
    /// The engine was set up or used incorrectly. Treat as a bug.
    Internal,
}

impl Error {
    pub(crate) fn invalid_query(
        key: impl Into<String>,
        received: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidQuery {
            key: key.into(),
            received: received.into(),
            reason: reason.into(),
        }
    }

    /// Which of the three taxonomies this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidQuery { .. }
            | Error::InvalidEntry { .. }
            | Error::InvalidUnionHint { .. }
            | Error::NoUnionMatch { .. }
            | Error::AmbiguousUnionMatch { .. }
            | Error::InvalidArguments { .. }
            | Error::InvalidUnionAccess { .. }
            | Error::NoPropertiesOnLeaf { .. }
            | Error::UnknownProperty { .. }
            | Error::RecursionLimitExceeded { .. } => ErrorCategory::Client,
            Error::InvalidResolvedValue { .. } | Error::ResolverFailed(_) => ErrorCategory::Server,
            Error::UnresolvedReference { .. }
            | Error::InvalidResolverPath { .. }
            | Error::UnknownStructureKind { .. }
            | Error::CouldNotResolve { .. }
            | Error::MissingContextKey { .. }
            | Error::InvalidSchema { .. }
            | Error::InvalidConfiguration(_) => ErrorCategory::Internal,
        }
    }

    /// A stable code identifying the error.
    pub fn extension_code(&self) -> &'static str {
        match self {
            Error::InvalidQuery { .. } => "INVALID_QUERY",
            Error::InvalidEntry { .. } => "INVALID_ENTRY",
            Error::InvalidUnionHint { .. } => "INVALID_UNION_HINT",
            Error::NoUnionMatch { .. } => "NO_UNION_MATCH",
            Error::AmbiguousUnionMatch { .. } => "AMBIGUOUS_UNION_MATCH",
            Error::InvalidArguments { .. } => "INVALID_ARGUMENTS",
            Error::InvalidResolvedValue { .. } => "INVALID_RESOLVED_VALUE",
            Error::UnresolvedReference { .. } => "UNRESOLVED_REFERENCE",
            Error::InvalidResolverPath { .. } => "INVALID_RESOLVER_PATH",
            Error::UnknownStructureKind { .. } => "UNKNOWN_STRUCTURE_KIND",
            Error::CouldNotResolve { .. } => "COULD_NOT_RESOLVE",
            Error::InvalidUnionAccess { .. } => "INVALID_UNION_ACCESS",
            Error::NoPropertiesOnLeaf { .. } => "NO_PROPERTIES_ON_LEAF",
            Error::UnknownProperty { .. } => "UNKNOWN_PROPERTY",
            Error::MissingContextKey { .. } => "MISSING_CONTEXT_KEY",
            Error::RecursionLimitExceeded { .. } => "RECURSION_LIMIT_EXCEEDED",
            Error::InvalidSchema { .. } => "INVALID_SCHEMA",
            Error::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Error::ResolverFailed(_) => "RESOLVER_FAILED",
        }
    }

    /// Key of the node the error is about, when there is one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Error::InvalidQuery { key, .. }
            | Error::InvalidUnionHint { key, .. }
            | Error::NoUnionMatch { key, .. }
            | Error::AmbiguousUnionMatch { key, .. }
            | Error::InvalidArguments { key, .. }
            | Error::InvalidResolvedValue { key, .. }
            | Error::UnresolvedReference { key, .. }
            | Error::InvalidResolverPath { key }
            | Error::CouldNotResolve { key }
            | Error::InvalidUnionAccess { key, .. }
            | Error::NoPropertiesOnLeaf { key, .. }
            | Error::UnknownProperty { key, .. } => Some(key),
            Error::InvalidEntry { expected, .. } => Some(expected),
            Error::UnknownStructureKind { .. }
            | Error::MissingContextKey { .. }
            | Error::RecursionLimitExceeded { .. }
            | Error::InvalidSchema { .. }
            | Error::InvalidConfiguration(_)
            | Error::ResolverFailed(_) => None,
        }
    }

    /// Convert the error to what a client is allowed to see.
    ///
    /// Server and internal errors keep their code but their message is replaced.
    pub fn to_response_error(&self) -> ResponseError {
        let mut extensions = Object::new();
        extensions.insert(
            ByteString::from("code"),
            Value::String(ByteString::from(self.extension_code())),
        );
        let message = match self.category() {
            ErrorCategory::Client => {
                if let Some(key) = self.key() {
                    extensions.insert(ByteString::from("key"), Value::String(ByteString::from(key)));
                }
                self.to_string()
            }
            ErrorCategory::Server | ErrorCategory::Internal => {
                String::from("internal error while resolving the query")
            }
        };
        ResponseError {
            message,
            extensions,
        }
    }
}

impl From<BoxError> for Error {
    fn from(error: BoxError) -> Self {
        match error.downcast::<Error>() {
            Ok(error) => *error,
            Err(error) => Error::ResolverFailed(error),
        }
    }
}

/// An error as exposed to clients.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResponseError {
    /// The error message.
    pub message: String,

    /// The error code and, for client errors, the key of the offending node.
    #[serde(default, skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}
