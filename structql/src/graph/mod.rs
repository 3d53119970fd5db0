//! Navigation over a [`Schema`].
//!
//! A [`Graph`] is an arena of nodes. Each node pairs a [`Structure`] with the generic bindings in
//! force where it was reached. Children are created lazily and memoized per `(parent, prop)`, so
//! navigating to the same logical position twice yields the same [`GraphNode`]. Resolvers are
//! registered against that identity.


use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::Error;
use crate::schema::unresolved;
use crate::schema::Schema;
use crate::schema::Structure;
use crate::schema::StructureKind;

/// Index of a node in its graph's arena.
pub(crate) type NodeId = usize;

const ROOT: NodeId = 0;

/// A step from a node to one of its children.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Prop {
    /// A root level declaration.
    Entry(String),
    /// An object property or a function argument.
    Field(String),
    Items,
    Arguments,
    Returns,
    /// A union member, by position.
    Member(usize),
    /// The non-null side of a nullable.
    Inner,
    /// The declaration a reference points to.
    Target,
    /// The aliased structure.
    Body,
}

impl fmt::Display for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prop::Entry(name) | Prop::Field(name) => f.write_str(name),
            Prop::Items => f.write_str("items"),
            Prop::Arguments => f.write_str("arguments"),
            Prop::Returns => f.write_str("returns"),
            Prop::Member(index) => write!(f, "[{index}]"),
            Prop::Inner => f.write_str("inner"),
            Prop::Target => f.write_str("target"),
            Prop::Body => f.write_str("body"),
        }
    }
}

/// Generic parameters bound where a node was reached, by placeholder name.
#[derive(Clone, Debug, Default)]
pub struct Bindings(Arc<IndexMap<String, Binding>>);

/// A type argument together with the bindings of the scope it was written in.
#[derive(Clone, Debug)]
pub struct Binding {
    pub structure: Arc<Structure>,
    pub bindings: Bindings,
}

impl Bindings {
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[derive(Debug)]
struct NodeData {
    structure: Arc<Structure>,
    parent: Option<NodeId>,
    prop: Option<Prop>,
    /// Set on nodes that start a new root level declaration: their path restarts.
    declaration: bool,
    bindings: Bindings,
}

struct GraphInner {
    schema: Schema,
    nodes: RwLock<Vec<Arc<NodeData>>>,
    children: DashMap<(NodeId, Prop), NodeId>,
}

/// The navigable view of a [`Schema`].
///
/// Cheap to clone; clones share the same arena.
#[derive(Clone)]
pub struct Graph {
    inner: Arc<GraphInner>,
}

impl Graph {
    pub fn new(schema: Schema) -> Self {
        let root = NodeData {
            structure: schema.root().clone(),
            parent: None,
            prop: None,
            declaration: true,
            bindings: Bindings::default(),
        };
        Graph {
            inner: Arc::new(GraphInner {
                schema,
                nodes: RwLock::new(vec![Arc::new(root)]),
                children: DashMap::new(),
            }),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn root(&self) -> GraphNode {
        self.node(ROOT)
    }

    /// Shorthand for `graph.root().get(name)`.
    pub fn entry(&self, name: &str) -> Result<GraphNode, Error> {
        self.root().get(name)
    }

    /// Navigates from the root through every step of `path`.
    pub fn at<S: AsRef<str>>(&self, path: &[S]) -> Result<GraphNode, Error> {
        path.iter()
            .try_fold(self.root(), |node, prop| node.get(prop.as_ref()))
    }

    /// Number of nodes created so far.
    pub fn node_count(&self) -> usize {
        self.inner.nodes.read().len()
    }

    pub(crate) fn same(&self, other: &Graph) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn node(&self, id: NodeId) -> GraphNode {
        let data = self.inner.nodes.read()[id].clone();
        GraphNode {
            graph: self.clone(),
            id,
            data,
        }
    }

    fn child(&self, parent: &GraphNode, prop: Prop) -> Result<GraphNode, Error> {
        let id = match self.inner.children.entry((parent.id, prop)) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let data = self.child_data(parent, &entry.key().1)?;
                let id = {
                    let mut nodes = self.inner.nodes.write();
                    nodes.push(Arc::new(data));
                    nodes.len() - 1
                };
                entry.insert(id);
                id
            }
        };
        Ok(self.node(id))
    }

    fn child_data(&self, parent: &GraphNode, prop: &Prop) -> Result<NodeData, Error> {
        let bindings = &parent.data.bindings;
        let nested = |structure: &Arc<Structure>| {
            let (structure, bindings) = substitute(structure, bindings);
            NodeData {
                structure,
                parent: Some(parent.id),
                prop: Some(prop.clone()),
                declaration: false,
                bindings,
            }
        };
        let structure = parent.structure();
        let data = match (structure.as_ref(), prop) {
            (Structure::Root(root), Prop::Entry(name)) => {
                let entry = root.entries.get(name).ok_or_else(|| Error::UnknownProperty {
                    key: parent.key().to_string(),
                    prop: name.clone(),
                })?;
                NodeData {
                    structure: entry.clone(),
                    parent: Some(parent.id),
                    prop: Some(prop.clone()),
                    declaration: true,
                    bindings: Bindings::default(),
                }
            }
            (Structure::Object(object), Prop::Field(name)) => {
                let property = object.property(name).ok_or_else(|| Error::UnknownProperty {
                    key: object.key.clone(),
                    prop: name.clone(),
                })?;
                nested(&property.structure)
            }
            (Structure::Arguments(arguments), Prop::Field(name)) => {
                let item = arguments.item(name).ok_or_else(|| Error::UnknownProperty {
                    key: arguments.key.clone(),
                    prop: name.clone(),
                })?;
                nested(&item.structure)
            }
            (Structure::Array(array), Prop::Items) => nested(&array.items),
            (Structure::Function(function), Prop::Arguments) => nested(&function.arguments),
            (Structure::Function(function), Prop::Returns) => nested(&function.returns),
            (Structure::Union(union), Prop::Member(index)) => {
                let member = union
                    .members
                    .get(*index)
                    .ok_or_else(|| Error::InvalidUnionAccess {
                        key: union.key.clone(),
                        member: prop.to_string(),
                    })?;
                nested(member)
            }
            (Structure::Nullable(nullable), Prop::Inner) => nested(&nullable.inner),
            (Structure::Alias(alias), Prop::Body) => nested(&alias.ty),
            (Structure::Ref(reference), Prop::Target) => {
                let target = self
                    .inner
                    .schema
                    .entry(&reference.target)
                    .ok_or_else(|| unresolved(reference, "no such declaration"))?;
                let parameters = target.parameters();
                if parameters.len() != reference.type_arguments.len() {
                    return Err(unresolved(
                        reference,
                        format!(
                            "expected {} type arguments, received {}",
                            parameters.len(),
                            reference.type_arguments.len()
                        ),
                    ));
                }
                let bound = parameters
                    .iter()
                    .zip(&reference.type_arguments)
                    .map(|(name, argument)| {
                        let (structure, bindings) = substitute(argument, bindings);
                        (
                            name.clone(),
                            Binding {
                                structure,
                                bindings,
                            },
                        )
                    })
                    .collect();
                NodeData {
                    structure: target.clone(),
                    parent: Some(parent.id),
                    prop: Some(prop.clone()),
                    declaration: true,
                    bindings: Bindings(Arc::new(bound)),
                }
            }
            (_, prop) => {
                return Err(Error::UnknownProperty {
                    key: parent.key().to_string(),
                    prop: prop.to_string(),
                })
            }
        };
        Ok(data)
    }
}

/// Replaces a bound placeholder reference by its binding.
fn substitute(structure: &Arc<Structure>, bindings: &Bindings) -> (Arc<Structure>, Bindings) {
    if let Structure::Ref(reference) = structure.as_ref() {
        if let Some(binding) = bindings.get(&reference.target) {
            return (binding.structure.clone(), binding.bindings.clone());
        }
    }
    (structure.clone(), bindings.clone())
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("entries", &self.inner.schema.entries().len())
            .field("nodes", &self.node_count())
            .finish()
    }
}

/// An identity-stable handle on a position in a [`Graph`].
#[derive(Clone)]
pub struct GraphNode {
    graph: Graph,
    id: NodeId,
    data: Arc<NodeData>,
}

impl GraphNode {
    /// Navigates to a child.
    ///
    /// - on the root, `prop` names a declaration;
    /// - on objects and argument lists, a property;
    /// - on arrays, only `items`;
    /// - on functions, `arguments` or `returns`;
    /// - on unions, the name of a member;
    /// - references, aliases and nullables are stepped through first.
    pub fn get(&self, prop: &str) -> Result<GraphNode, Error> {
        match self.structure().as_ref() {
            Structure::Root(_) => self.graph.child(self, Prop::Entry(prop.to_string())),
            Structure::Object(_) | Structure::Arguments(_) => {
                self.graph.child(self, Prop::Field(prop.to_string()))
            }
            Structure::Alias(_) => self.body()?.get(prop),
            Structure::Ref(_) => self.target()?.get(prop),
            Structure::Nullable(_) => self.inner()?.get(prop),
            Structure::Union(_) => self.member(prop),
            Structure::Array(_) => match prop {
                "items" => self.items(),
                _ => Err(self.unknown_property(prop)),
            },
            Structure::Function(_) => match prop {
                "arguments" => self.arguments(),
                "returns" => self.returns(),
                _ => Err(self.unknown_property(prop)),
            },
            Structure::Primitive(_) | Structure::Literal(_) => Err(Error::NoPropertiesOnLeaf {
                key: self.key().to_string(),
                prop: prop.to_string(),
            }),
        }
    }

    /// Navigates through every step of `path`.
    pub fn at<S: AsRef<str>>(&self, path: &[S]) -> Result<GraphNode, Error> {
        path.iter()
            .try_fold(self.clone(), |node, prop| node.get(prop.as_ref()))
    }

    pub fn items(&self) -> Result<GraphNode, Error> {
        self.graph.child(self, Prop::Items)
    }

    pub fn arguments(&self) -> Result<GraphNode, Error> {
        self.graph.child(self, Prop::Arguments)
    }

    pub fn returns(&self) -> Result<GraphNode, Error> {
        self.graph.child(self, Prop::Returns)
    }

    pub fn inner(&self) -> Result<GraphNode, Error> {
        self.graph.child(self, Prop::Inner)
    }

    pub fn body(&self) -> Result<GraphNode, Error> {
        self.graph.child(self, Prop::Body)
    }

    /// Dereferences a [`Structure::Ref`], binding the target's type parameters.
    pub fn target(&self) -> Result<GraphNode, Error> {
        self.graph.child(self, Prop::Target)
    }

    /// The union member declared under `name`.
    ///
    /// Members are named by their reference target, their declared name, or their primitive type.
    pub fn member(&self, name: &str) -> Result<GraphNode, Error> {
        let count = match self.structure().as_ref() {
            Structure::Union(union) => union.members.len(),
            _ => {
                return Err(Error::InvalidUnionAccess {
                    key: self.key().to_string(),
                    member: name.to_string(),
                })
            }
        };
        for index in 0..count {
            let member = self.member_at(index)?;
            if member.declared_name().as_deref() == Some(name) {
                return Ok(member);
            }
        }
        Err(Error::InvalidUnionAccess {
            key: self.key().to_string(),
            member: name.to_string(),
        })
    }

    pub fn member_at(&self, index: usize) -> Result<GraphNode, Error> {
        self.graph.child(self, Prop::Member(index))
    }

    /// Every member of a union, in declaration order. Empty for anything else.
    pub fn members(&self) -> Result<Vec<GraphNode>, Error> {
        match self.structure().as_ref() {
            Structure::Union(union) => (0..union.members.len())
                .map(|index| self.member_at(index))
                .collect(),
            _ => Ok(Vec::new()),
        }
    }

    /// Steps through references and aliases until a structure that carries a value shape.
    pub fn concrete(&self) -> Result<GraphNode, Error> {
        let mut node = self.clone();
        loop {
            node = match node.kind() {
                StructureKind::Ref => node.target()?,
                StructureKind::Alias => node.body()?,
                _ => return Ok(node),
            };
        }
    }

    /// The name a union member is addressed by.
    pub fn declared_name(&self) -> Option<String> {
        match self.structure().as_ref() {
            Structure::Ref(reference) => Some(reference.target.clone()),
            Structure::Object(object) => object.name.clone(),
            Structure::Alias(alias) => Some(alias.name.clone()),
            Structure::Primitive(primitive) => Some(primitive.primitive.to_string()),
            _ => None,
        }
    }

    pub fn structure(&self) -> &Arc<Structure> {
        &self.data.structure
    }

    pub fn kind(&self) -> StructureKind {
        self.data.structure.kind()
    }

    pub fn key(&self) -> &str {
        self.data.structure.key()
    }

    pub fn bindings(&self) -> &Bindings {
        &self.data.bindings
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn parent(&self) -> Option<GraphNode> {
        self.data.parent.map(|id| self.graph.node(id))
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT
    }

    /// The structures crossed since the last root level declaration was entered.
    ///
    /// Empty for the root. Entering a reference restarts the path at its target.
    pub fn path(&self) -> Vec<Arc<Structure>> {
        let mut path = Vec::new();
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.is_root() {
                break;
            }
            path.push(node.structure().clone());
            if node.data.declaration {
                break;
            }
            current = node.parent();
        }
        path.reverse();
        path
    }

    /// The root of the graph this node was reached from.
    pub(crate) fn root(&self) -> GraphNode {
        let mut node = self.clone();
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }

    /// A stable identifier for the structure this node resolves, for resolver lookup.
    pub(crate) fn structure_id(&self) -> usize {
        Arc::as_ptr(&self.data.structure) as *const () as usize
    }

    fn unknown_property(&self, prop: &str) -> Error {
        Error::UnknownProperty {
            key: self.key().to_string(),
            prop: prop.to_string(),
        }
    }
}

impl PartialEq for GraphNode {
    fn eq(&self, other: &Self) -> bool {
        self.graph.same(&other.graph) && self.id == other.id
    }
}

impl Eq for GraphNode {}

impl Hash for GraphNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.graph.inner).hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("key", &self.key())
            .field("prop", &self.data.prop)
            .finish()
    }
}
