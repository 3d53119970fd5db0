//! The structure tree model.
//!
//! This is the shape the external schema compiler produces: a `kind`-tagged tree rooted at a
//! [`RootStructure`]. Every node is shared through an [`Arc`] and never mutated once built.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;

use crate::json_ext::Value;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
/// A node in the schema tree describing one type's shape.
///
/// Nodes are compared by identity (see [`Structure::same`]), never structurally: the same
/// reference may expand to distinct bindings depending on where it is reached from.
pub enum Structure {
    /// The entry point. Has no runtime value.
    Root(RootStructure),
    /// An object literal or a named interface.
    Object(ObjectStructure),
    /// A generic type alias.
    Alias(AliasStructure),
    /// A reference to a root entry or to a type parameter in scope.
    Ref(RefStructure),
    /// One of several member structures.
    Union(UnionStructure),
    /// A list of items.
    Array(ArrayStructure),
    /// An inner structure or null.
    Nullable(NullableStructure),
    /// A callable field.
    Function(FunctionStructure),
    /// The parameter list of a function.
    Arguments(ArgumentsStructure),
    /// A string, number or boolean.
    Primitive(PrimitiveStructure),
    /// A single constant value.
    Literal(LiteralStructure),
}

/// The kind of a [`Structure`], without its payload.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    strum_macros::Display,
    strum_macros::IntoStaticStr,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "camelCase")]
pub enum StructureKind {
    Root,
    Object,
    Alias,
    Ref,
    Union,
    Array,
    Nullable,
    Function,
    Arguments,
    Primitive,
    Literal,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootStructure {
    /// Root level declarations, by name.
    pub entries: IndexMap<String, Arc<Structure>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStructure {
    pub key: String,
    /// The declared name, for named interfaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Type parameter names, for generic interfaces.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    pub properties: Vec<Property>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasStructure {
    pub key: String,
    pub name: String,
    /// Placeholder names, bound positionally by a reference's type arguments.
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(rename = "type")]
    pub ty: Arc<Structure>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefStructure {
    pub key: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_arguments: Vec<Arc<Structure>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnionStructure {
    pub key: String,
    pub members: Vec<Arc<Structure>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayStructure {
    pub key: String,
    pub items: Arc<Structure>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NullableStructure {
    pub key: String,
    pub inner: Arc<Structure>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionStructure {
    pub key: String,
    /// Always an [`Structure::Arguments`].
    pub arguments: Arc<Structure>,
    pub returns: Arc<Structure>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentsStructure {
    pub key: String,
    pub items: Vec<Property>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimitiveStructure {
    pub key: String,
    #[serde(rename = "type")]
    pub primitive: PrimitiveKind,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiteralStructure {
    pub key: String,
    /// A string, number, boolean or null.
    pub value: Value,
}

/// A named member of an object or of an argument list.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub name: String,
    pub structure: Arc<Structure>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum PrimitiveKind {
    String,
    Number,
    Boolean,
}

impl Structure {
    pub fn kind(&self) -> StructureKind {
        match self {
            Structure::Root(_) => StructureKind::Root,
            Structure::Object(_) => StructureKind::Object,
            Structure::Alias(_) => StructureKind::Alias,
            Structure::Ref(_) => StructureKind::Ref,
            Structure::Union(_) => StructureKind::Union,
            Structure::Array(_) => StructureKind::Array,
            Structure::Nullable(_) => StructureKind::Nullable,
            Structure::Function(_) => StructureKind::Function,
            Structure::Arguments(_) => StructureKind::Arguments,
            Structure::Primitive(_) => StructureKind::Primitive,
            Structure::Literal(_) => StructureKind::Literal,
        }
    }

    /// The dotted declaration path of this node, used for diagnostics.
    ///
    /// The root has an empty key.
    pub fn key(&self) -> &str {
        match self {
            Structure::Root(_) => "",
            Structure::Object(s) => &s.key,
            Structure::Alias(s) => &s.key,
            Structure::Ref(s) => &s.key,
            Structure::Union(s) => &s.key,
            Structure::Array(s) => &s.key,
            Structure::Nullable(s) => &s.key,
            Structure::Function(s) => &s.key,
            Structure::Arguments(s) => &s.key,
            Structure::Primitive(s) => &s.key,
            Structure::Literal(s) => &s.key,
        }
    }

    /// Type parameters declared by this node, if it is a generic declaration.
    pub fn parameters(&self) -> &[String] {
        match self {
            Structure::Alias(s) => &s.parameters,
            Structure::Object(s) => &s.parameters,
            _ => &[],
        }
    }

    /// Identity comparison.
    pub fn same(left: &Arc<Structure>, right: &Arc<Structure>) -> bool {
        Arc::ptr_eq(left, right)
    }

    pub fn object(key: impl Into<String>, properties: Vec<Property>) -> Arc<Structure> {
        Arc::new(Structure::Object(ObjectStructure {
            key: key.into(),
            name: None,
            parameters: Vec::new(),
            properties,
        }))
    }

    /// A named, possibly generic, interface.
    pub fn interface(
        key: impl Into<String>,
        name: impl Into<String>,
        parameters: Vec<String>,
        properties: Vec<Property>,
    ) -> Arc<Structure> {
        Arc::new(Structure::Object(ObjectStructure {
            key: key.into(),
            name: Some(name.into()),
            parameters,
            properties,
        }))
    }

    pub fn alias(
        key: impl Into<String>,
        name: impl Into<String>,
        parameters: Vec<String>,
        ty: Arc<Structure>,
    ) -> Arc<Structure> {
        Arc::new(Structure::Alias(AliasStructure {
            key: key.into(),
            name: name.into(),
            parameters,
            ty,
        }))
    }

    pub fn reference(
        key: impl Into<String>,
        target: impl Into<String>,
        type_arguments: Vec<Arc<Structure>>,
    ) -> Arc<Structure> {
        Arc::new(Structure::Ref(RefStructure {
            key: key.into(),
            target: target.into(),
            type_arguments,
        }))
    }

    pub fn union(key: impl Into<String>, members: Vec<Arc<Structure>>) -> Arc<Structure> {
        Arc::new(Structure::Union(UnionStructure {
            key: key.into(),
            members,
        }))
    }

    pub fn array(key: impl Into<String>, items: Arc<Structure>) -> Arc<Structure> {
        Arc::new(Structure::Array(ArrayStructure {
            key: key.into(),
            items,
        }))
    }

    pub fn nullable(key: impl Into<String>, inner: Arc<Structure>) -> Arc<Structure> {
        Arc::new(Structure::Nullable(NullableStructure {
            key: key.into(),
            inner,
        }))
    }

    pub fn function(
        key: impl Into<String>,
        arguments: Vec<Property>,
        returns: Arc<Structure>,
    ) -> Arc<Structure> {
        let key = key.into();
        let arguments = Arc::new(Structure::Arguments(ArgumentsStructure {
            key: format!("{key}.arguments"),
            items: arguments,
        }));
        Arc::new(Structure::Function(FunctionStructure {
            key,
            arguments,
            returns,
        }))
    }

    pub fn primitive(key: impl Into<String>, primitive: PrimitiveKind) -> Arc<Structure> {
        Arc::new(Structure::Primitive(PrimitiveStructure {
            key: key.into(),
            primitive,
        }))
    }

    pub fn string(key: impl Into<String>) -> Arc<Structure> {
        Self::primitive(key, PrimitiveKind::String)
    }

    pub fn number(key: impl Into<String>) -> Arc<Structure> {
        Self::primitive(key, PrimitiveKind::Number)
    }

    pub fn boolean(key: impl Into<String>) -> Arc<Structure> {
        Self::primitive(key, PrimitiveKind::Boolean)
    }

    pub fn literal(key: impl Into<String>, value: impl Into<Value>) -> Arc<Structure> {
        Arc::new(Structure::Literal(LiteralStructure {
            key: key.into(),
            value: value.into(),
        }))
    }
}

impl Property {
    pub fn new(name: impl Into<String>, structure: Arc<Structure>) -> Self {
        Self {
            name: name.into(),
            structure,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

impl ObjectStructure {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|property| property.name == name)
    }
}

impl ArgumentsStructure {
    pub fn item(&self, name: &str) -> Option<&Property> {
        self.items.iter().find(|item| item.name == name)
    }
}
