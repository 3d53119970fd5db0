//! Picks which member of a union a runtime value represents.
//!
//! Matching is structural: a value matches a member when its shape is compatible with the
//! member's structure. Object shapes only validate the properties present in the value; a
//! missing property never disqualifies a member, an undeclared one always does.

use itertools::Itertools;

use crate::error::Error;
use crate::graph::GraphNode;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::schema::PrimitiveKind;
use crate::schema::Structure;

/// Selects the member of `union` that `value` represents.
///
/// With a `hint`, the member is looked up by name and returned without probing `value`.
pub fn match_member(
    union: &GraphNode,
    value: Option<&Value>,
    hint: Option<&str>,
) -> Result<GraphNode, Error> {
    if let Some(hint) = hint {
        return union.member(hint).map_err(|_| Error::InvalidUnionHint {
            key: union.key().to_string(),
            hint: hint.to_string(),
        });
    }

    let received = value.map_or_else(|| "undefined".to_string(), ValueExt::to_json_text);
    let Some(value) = value else {
        return Err(Error::NoUnionMatch {
            key: union.key().to_string(),
            received,
        });
    };

    let mut candidates = Vec::new();
    for member in union.members()? {
        if matches_shape(&member, value)? {
            candidates.push(member);
        }
    }
    match candidates.len() {
        0 => Err(Error::NoUnionMatch {
            key: union.key().to_string(),
            received,
        }),
        1 => Ok(candidates.remove(0)),
        _ => Err(Error::AmbiguousUnionMatch {
            key: union.key().to_string(),
            received,
            candidates: candidates
                .iter()
                .map(|member| format!("'{}'", member.key()))
                .join(", "),
        }),
    }
}

/// Structurally tests `value` against the structure of `node`.
pub fn matches_shape(node: &GraphNode, value: &Value) -> Result<bool, Error> {
    let matched = match node.structure().as_ref() {
        Structure::Root(_) => false,
        Structure::Ref(_) | Structure::Alias(_) => matches_shape(&node.concrete()?, value)?,
        Structure::Primitive(primitive) => matches!(
            (primitive.primitive, value),
            (PrimitiveKind::String, Value::String(_))
                | (PrimitiveKind::Number, Value::Number(_))
                | (PrimitiveKind::Boolean, Value::Bool(_))
        ),
        Structure::Literal(literal) => literal.value == *value,
        Structure::Nullable(_) => value.is_null() || matches_shape(&node.inner()?, value)?,
        Structure::Array(_) => match value {
            Value::Array(items) => {
                let node = node.items()?;
                let mut matched = true;
                for item in items {
                    if !matches_shape(&node, item)? {
                        matched = false;
                        break;
                    }
                }
                matched
            }
            _ => false,
        },
        Structure::Union(_) => {
            let mut matched = false;
            for member in node.members()? {
                if matches_shape(&member, value)? {
                    matched = true;
                    break;
                }
            }
            matched
        }
        Structure::Object(_) | Structure::Arguments(_) => match value {
            Value::Object(object) => {
                let mut matched = true;
                for (name, field) in object.iter() {
                    let child = match node.get(name.as_str()) {
                        Ok(child) => child,
                        Err(Error::UnknownProperty { .. }) => {
                            matched = false;
                            break;
                        }
                        Err(error) => return Err(error),
                    };
                    if !matches_shape(&child, field)? {
                        matched = false;
                        break;
                    }
                }
                matched
            }
            _ => false,
        },
        // a resolved function value is whatever its resolver returns
        Structure::Function(_) => true,
    };
    Ok(matched)
}

/// Checks call arguments against the argument list of `function`.
///
/// Every required item must be present, present items must match their structure, and nothing
/// undeclared may be passed.
pub(crate) fn check_arguments(function: &GraphNode, received: &Value) -> Result<(), Error> {
    let arguments = function.arguments()?;
    let invalid = |reason: String| Error::InvalidArguments {
        key: function.key().to_string(),
        received: received.to_json_text(),
        reason,
    };
    let Structure::Arguments(declared) = arguments.structure().as_ref() else {
        return Err(invalid(format!(
            "expected an argument list, found '{}'",
            arguments.kind()
        )));
    };
    let Value::Object(object) = received else {
        return Err(invalid(format!(
            "arguments must be an object, received {}",
            received.json_type_name()
        )));
    };
    for item in &declared.items {
        if !item.optional && object.get(item.name.as_str()).is_none() {
            return Err(invalid(format!("missing required argument '{}'", item.name)));
        }
    }
    for (name, value) in object.iter() {
        let node = match arguments.get(name.as_str()) {
            Ok(node) => node,
            Err(Error::UnknownProperty { .. }) => {
                return Err(invalid(format!("unknown argument '{}'", name.as_str())))
            }
            Err(error) => return Err(error),
        };
        if !matches_shape(&node, value)? {
            return Err(invalid(format!(
                "argument '{}' does not match '{}'",
                name.as_str(),
                node.key()
            )));
        }
    }
    Ok(())
}
