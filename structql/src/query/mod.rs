//! Query definitions and their compilation into middleware.
//!
//! A query definition is a JSON list of instructions. An instruction is either a step, a string
//! or a number understood by the structure it is applied to, or an object tagged by `kind`:
//!
//! | kind       | fields                      | applies to                     |
//! |------------|-----------------------------|--------------------------------|
//! | `select`   | `fields: {name: query}`     | objects                        |
//! | `path`     | `path: query`, `query?`     | anywhere, restarts at the root |
//! | `call`     | `args?: {name: value}`      | functions                      |
//! | `all`      |                             | arrays                         |
//! | `first`    |                             | arrays                         |
//! | `paginate` | `page`, `pageSize`          | arrays                         |
//! | `as`       | `type: member name`         | unions                         |
//! | `variable` | `index`                     | replaced before compilation    |

mod compiler;
mod operators;

pub use compiler::Compiler;
pub use compiler::Descend;
pub use operators::Operator;
pub(crate) use operators::builtin_operators;

use crate::error::Error;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

/// The `kind` tag of an instruction object.
pub fn instruction_kind(instruction: &Value) -> Option<&str> {
    match instruction {
        Value::Object(object) => object.get("kind").and_then(Value::as_str),
        _ => None,
    }
}

/// The fields of an instruction object.
pub(crate) fn instruction_fields(instruction: &Value) -> Option<&Object> {
    match instruction {
        Value::Object(object) => Some(object),
        _ => None,
    }
}

/// Reads an instruction field that must be a list of instructions.
pub(crate) fn query_field<'a>(
    key: &str,
    instruction: &'a Value,
    field: &str,
) -> Result<Option<&'a [Value]>, Error> {
    let Some(value) = instruction_fields(instruction).and_then(|fields| fields.get(field)) else {
        return Ok(None);
    };
    match value {
        Value::Array(items) => Ok(Some(items.as_slice())),
        _ => Err(Error::invalid_query(
            key,
            instruction.to_json_text(),
            format!("'{field}' must be a list of instructions"),
        )),
    }
}

/// Reads an instruction field that must be a positive integer.
pub(crate) fn positive_field(key: &str, instruction: &Value, field: &str) -> Result<usize, Error> {
    instruction_fields(instruction)
        .and_then(|fields| fields.get(field))
        .and_then(Value::as_u64)
        .filter(|value| *value > 0)
        .and_then(|value| usize::try_from(value).ok())
        .ok_or_else(|| {
            Error::invalid_query(
                key,
                instruction.to_json_text(),
                format!("'{field}' must be a positive integer"),
            )
        })
}

/// Replaces every `{"kind": "variable", "index": n}` in `query` by `variables[n]`.
///
/// Substituted values are taken as is: a variable holding an instruction object is not expanded
/// again.
pub fn substitute_variables(key: &str, query: &Value, variables: &[Value]) -> Result<Value, Error> {
    if instruction_kind(query) == Some("variable") {
        let index = instruction_fields(query)
            .and_then(|fields| fields.get("index"))
            .and_then(Value::as_u64)
            .and_then(|index| usize::try_from(index).ok());
        return match index.and_then(|index| variables.get(index)) {
            Some(value) => Ok(value.clone()),
            None => Err(Error::invalid_query(
                key,
                query.to_json_text(),
                format!(
                    "variable index out of range, {} variables were supplied",
                    variables.len()
                ),
            )),
        };
    }
    match query {
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|item| substitute_variables(key, item, variables))
                .collect::<Result<_, _>>()?,
        )),
        Value::Object(object) => {
            let mut substituted = Object::new();
            for (name, value) in object.iter() {
                substituted.insert(name.clone(), substitute_variables(key, value, variables)?);
            }
            Ok(Value::Object(substituted))
        }
        _ => Ok(query.clone()),
    }
}
