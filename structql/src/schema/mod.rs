//! Schema ingestion.
//!
//! The structure tree is produced by an external compiler. This module checks the contract that
//! compiler must honour before anything navigates the tree: every reference names a root entry or
//! a type parameter in scope, and generic declarations receive as many type arguments as they
//! declare parameters.

mod structure;

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
pub use structure::*;

use crate::error::Error;
use crate::json_ext::Value;

/// An immutable structure tree, rooted at a [`Structure::Root`].
#[derive(Clone, Debug)]
pub struct Schema {
    root: Arc<Structure>,
}

impl Schema {
    /// Builds a schema from root level declarations.
    pub fn new<N>(entries: impl IntoIterator<Item = (N, Arc<Structure>)>) -> Result<Self, Error>
    where
        N: Into<String>,
    {
        let entries: IndexMap<String, Arc<Structure>> = entries
            .into_iter()
            .map(|(name, structure)| (name.into(), structure))
            .collect();
        Self::from_root(Arc::new(Structure::Root(RootStructure { entries })))
    }

    /// Parses a `kind`-tagged structure tree.
    ///
    /// The top level may either be a `{"kind": "root", ...}` node or its bare `entries` object.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|error| Error::InvalidSchema {
                reason: error.to_string(),
            })?;
        Self::from_value(value)
    }

    pub fn from_value(mut value: serde_json::Value) -> Result<Self, Error> {
        check_kinds(&value)?;
        if let serde_json::Value::Object(object) = &mut value {
            if !object.contains_key("kind") {
                object.insert("kind".to_string(), "root".into());
            }
        }
        let root: Structure =
            serde_json::from_value(value).map_err(|error| Error::InvalidSchema {
                reason: error.to_string(),
            })?;
        if root.kind() != StructureKind::Root {
            return Err(Error::InvalidSchema {
                reason: format!("expected a root structure, found '{}'", root.kind()),
            });
        }
        Self::from_root(Arc::new(root))
    }

    fn from_root(root: Arc<Structure>) -> Result<Self, Error> {
        let schema = Schema { root };
        schema.validate()?;
        tracing::debug!(entries = schema.entries().len(), "schema loaded");
        Ok(schema)
    }

    pub fn root(&self) -> &Arc<Structure> {
        &self.root
    }

    pub fn entries(&self) -> &IndexMap<String, Arc<Structure>> {
        match self.root.as_ref() {
            Structure::Root(root) => &root.entries,
            // from_root only accepts roots
            _ => unreachable!("schema root is always a root structure; qed"),
        }
    }

    pub fn entry(&self, name: &str) -> Option<&Arc<Structure>> {
        self.entries().get(name)
    }

    fn validate(&self) -> Result<(), Error> {
        for structure in self.entries().values() {
            let scope: Vec<&str> = structure.parameters().iter().map(String::as_str).collect();
            self.validate_structure(structure, &scope)?;
        }
        self.check_reference_cycles()
    }

    /// Follows every declaration through aliases and references, rejecting chains that come back
    /// to a declaration with the same type arguments before reaching a concrete structure.
    ///
    /// Type arguments are carried along so `Box<Box<A>>` is not mistaken for a cycle. Chains whose
    /// arguments keep growing (`A<T> = A<Box<T>>`) are cut off after a bounded number of steps.
    fn check_reference_cycles(&self) -> Result<(), Error> {
        let limit = self.entries().len().max(1) * CYCLE_STEPS_PER_ENTRY;
        for (name, structure) in self.entries() {
            // placeholders of the starting declaration stay unbound
            let opaque: Vec<&str> = structure.parameters().iter().map(String::as_str).collect();
            let mut bindings: HashMap<&str, Arc<Structure>> = HashMap::new();
            let mut seen = HashSet::from([format!("{name}<[]>")]);
            let mut current = structure.clone();
            let mut steps = 0;
            loop {
                let next = match current.as_ref() {
                    Structure::Alias(alias) => alias.ty.clone(),
                    Structure::Ref(reference) => {
                        let target = reference.target.as_str();
                        if let Some(bound) = bindings.get(target).cloned() {
                            bound
                        } else if opaque.contains(&target) {
                            break;
                        } else {
                            let Some(declaration) = self.entry(target) else {
                                break;
                            };
                            let arguments: Vec<Arc<Structure>> = reference
                                .type_arguments
                                .iter()
                                .map(|argument| substitute(argument, &bindings, &opaque))
                                .collect();
                            let signature = format!(
                                "{target}<{}>",
                                serde_json::to_string(&arguments).unwrap_or_default()
                            );
                            steps += 1;
                            if !seen.insert(signature) || steps > limit {
                                return Err(unresolved(
                                    reference,
                                    "the reference never reaches a concrete structure",
                                ));
                            }
                            bindings = declaration
                                .parameters()
                                .iter()
                                .map(String::as_str)
                                .zip(arguments)
                                .collect();
                            declaration.clone()
                        }
                    }
                    _ => break,
                };
                current = next;
            }
        }
        Ok(())
    }

    fn validate_structure(&self, structure: &Arc<Structure>, scope: &[&str]) -> Result<(), Error> {
        match structure.as_ref() {
            Structure::Root(_) => Err(Error::InvalidSchema {
                reason: "a root structure can only appear at the top of the tree".to_string(),
            }),
            Structure::Object(object) => object
                .properties
                .iter()
                .try_for_each(|property| self.validate_structure(&property.structure, scope)),
            Structure::Alias(alias) => self.validate_structure(&alias.ty, scope),
            Structure::Ref(reference) => {
                self.check_reference(reference, scope)?;
                reference
                    .type_arguments
                    .iter()
                    .try_for_each(|argument| self.validate_structure(argument, scope))
            }
            Structure::Union(union) => union
                .members
                .iter()
                .try_for_each(|member| self.validate_structure(member, scope)),
            Structure::Array(array) => self.validate_structure(&array.items, scope),
            Structure::Nullable(nullable) => self.validate_structure(&nullable.inner, scope),
            Structure::Function(function) => {
                if function.arguments.kind() != StructureKind::Arguments {
                    return Err(Error::InvalidSchema {
                        reason: format!(
                            "arguments of '{}' must be an arguments structure, found '{}'",
                            function.key,
                            function.arguments.kind()
                        ),
                    });
                }
                self.validate_structure(&function.arguments, scope)?;
                self.validate_structure(&function.returns, scope)
            }
            Structure::Arguments(arguments) => arguments
                .items
                .iter()
                .try_for_each(|item| self.validate_structure(&item.structure, scope)),
            Structure::Primitive(_) => Ok(()),
            Structure::Literal(literal) => match literal.value {
                Value::Array(_) | Value::Object(_) => Err(Error::InvalidSchema {
                    reason: format!("literal '{}' must be a scalar or null", literal.key),
                }),
                _ => Ok(()),
            },
        }
    }

    fn check_reference(&self, reference: &RefStructure, scope: &[&str]) -> Result<(), Error> {
        if scope.contains(&reference.target.as_str()) {
            if !reference.type_arguments.is_empty() {
                return Err(unresolved(reference, "type parameters take no type arguments"));
            }
            return Ok(());
        }
        let target = self
            .entry(&reference.target)
            .ok_or_else(|| unresolved(reference, "no such declaration"))?;
        let expected = target.parameters().len();
        if expected != reference.type_arguments.len() {
            return Err(unresolved(
                reference,
                format!(
                    "expected {expected} type arguments, received {}",
                    reference.type_arguments.len()
                ),
            ));
        }
        Ok(())
    }
}

pub(crate) fn unresolved(reference: &RefStructure, reason: impl Into<String>) -> Error {
    Error::UnresolvedReference {
        key: reference.key.clone(),
        target: reference.target.clone(),
        reason: reason.into(),
    }
}

const CYCLE_STEPS_PER_ENTRY: usize = 32;

/// Replaces bound placeholders inside a type argument so it can be carried into another
/// declaration. Unbound placeholders become opaque leaves.
fn substitute(
    structure: &Arc<Structure>,
    bindings: &HashMap<&str, Arc<Structure>>,
    opaque: &[&str],
) -> Arc<Structure> {
    match structure.as_ref() {
        Structure::Ref(reference) => {
            if let Some(bound) = bindings.get(reference.target.as_str()) {
                return bound.clone();
            }
            if opaque.contains(&reference.target.as_str()) {
                return Structure::object(reference.key.clone(), Vec::new());
            }
            if reference.type_arguments.is_empty() {
                return structure.clone();
            }
            Structure::reference(
                reference.key.clone(),
                reference.target.clone(),
                reference
                    .type_arguments
                    .iter()
                    .map(|argument| substitute(argument, bindings, opaque))
                    .collect(),
            )
        }
        _ => structure.clone(),
    }
}

/// Rejects unknown `kind` tags before serde reports them as a generic parse error.
fn check_kinds(value: &serde_json::Value) -> Result<(), Error> {
    match value {
        serde_json::Value::Object(object) => {
            if let Some(serde_json::Value::String(kind)) = object.get("kind") {
                if kind.parse::<StructureKind>().is_err() {
                    return Err(Error::UnknownStructureKind { kind: kind.clone() });
                }
            }
            object.values().try_for_each(check_kinds)
        }
        serde_json::Value::Array(items) => items.iter().try_for_each(check_kinds),
        _ => Ok(()),
    }
}
