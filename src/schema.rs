//! Read-only type-system index built from schema SDL
//!
//! The cost validator never looks at resolvers, only at the shape of the
//! schema: which types exist, what kind they are, which fields they declare,
//! what those fields take and return, and which directives sit on them.
//! [`SchemaIndex`] holds exactly that, built from SDL parsed by
//! `async-graphql-parser`.

use std::collections::HashMap;

use async_graphql_parser::types::{
    BaseType, ConstDirective, InputValueDefinition, OperationType, ServiceDocument,
    Type, TypeDefinition, TypeKind as AstTypeKind, TypeSystemDefinition,
};
use async_graphql_parser::Positioned;
use async_graphql_value::{ConstValue, Name};
use indexmap::IndexMap;

use crate::{CostError, Result};

const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

/// Kind of a named type in the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
}

/// A named type with its fields and type-level directives
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: Name,
    pub kind: TypeKind,
    pub directives: Vec<ConstDirective>,
    /// Output fields (objects and interfaces)
    pub fields: IndexMap<Name, FieldInfo>,
    /// Input fields (input objects)
    pub input_fields: IndexMap<Name, ArgumentInfo>,
    /// Values (enums)
    pub enum_values: Vec<Name>,
}

impl TypeInfo {
    fn new(name: Name, kind: TypeKind) -> Self {
        Self {
            name,
            kind,
            directives: Vec::new(),
            fields: IndexMap::new(),
            input_fields: IndexMap::new(),
            enum_values: Vec::new(),
        }
    }

    pub fn is_object(&self) -> bool {
        self.kind == TypeKind::Object
    }

    /// Look up an output field, only meaningful for objects and interfaces
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.get(name)
    }

    /// First directive with the given name
    pub fn directive(&self, name: &str) -> Option<&ConstDirective> {
        find_directive(&self.directives, name)
    }
}

/// An output field definition
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: Name,
    pub arguments: IndexMap<Name, ArgumentInfo>,
    pub ty: Type,
    pub directives: Vec<ConstDirective>,
}

impl FieldInfo {
    /// Name of the return type with all list and non-null wrappers removed
    pub fn named_type(&self) -> &Name {
        named_type(&self.ty)
    }

    pub fn directive(&self, name: &str) -> Option<&ConstDirective> {
        find_directive(&self.directives, name)
    }
}

/// An argument or input field definition
#[derive(Debug, Clone)]
pub struct ArgumentInfo {
    pub name: Name,
    pub ty: Type,
    pub default_value: Option<ConstValue>,
}

impl From<&InputValueDefinition> for ArgumentInfo {
    fn from(def: &InputValueDefinition) -> Self {
        Self {
            name: def.name.node.clone(),
            ty: def.ty.node.clone(),
            default_value: def.default_value.as_ref().map(|v| v.node.clone()),
        }
    }
}

/// Index over every named type of a schema plus its root operation types
#[derive(Debug, Clone)]
pub struct SchemaIndex {
    types: HashMap<Name, TypeInfo>,
    query_type: Option<Name>,
    mutation_type: Option<Name>,
    subscription_type: Option<Name>,
}

impl SchemaIndex {
    /// Parse SDL and index it
    ///
    /// # Example
    ///
    /// ```rust
    /// use graphql_query_cost::SchemaIndex;
    ///
    /// let schema = SchemaIndex::parse("type Query { hello: String }").unwrap();
    /// assert!(schema.type_by_name("Query").is_some());
    /// ```
    pub fn parse(sdl: &str) -> Result<Self> {
        let document = async_graphql_parser::parse_schema(sdl)?;
        Self::from_document(&document)
    }

    /// Index an already parsed service document
    pub fn from_document(document: &ServiceDocument) -> Result<Self> {
        let mut types: HashMap<Name, TypeInfo> = BUILTIN_SCALARS
            .iter()
            .map(|name| (Name::new(name), TypeInfo::new(Name::new(name), TypeKind::Scalar)))
            .collect();
        let mut roots: [Option<Name>; 3] = [None, None, None];
        let mut extensions = Vec::new();

        for definition in &document.definitions {
            match definition {
                TypeSystemDefinition::Schema(schema) => {
                    let schema = &schema.node;
                    for (slot, root) in roots
                        .iter_mut()
                        .zip([&schema.query, &schema.mutation, &schema.subscription])
                    {
                        if let Some(root) = root {
                            *slot = Some(root.node.clone());
                        }
                    }
                }
                TypeSystemDefinition::Type(ty) if ty.node.extend => extensions.push(&ty.node),
                TypeSystemDefinition::Type(ty) => {
                    let name = ty.node.name.node.clone();
                    // Some SDL printers emit the built-in scalars too.
                    if BUILTIN_SCALARS.contains(&name.as_str())
                        && matches!(ty.node.kind, AstTypeKind::Scalar)
                    {
                        continue;
                    }
                    if types.contains_key(&name) {
                        return Err(CostError::InvalidSchema(format!(
                            "Type \"{}\" is defined more than once",
                            name
                        )));
                    }
                    let mut info = TypeInfo::new(name.clone(), kind_of(&ty.node.kind));
                    merge_definition(&mut info, &ty.node);
                    types.insert(name, info);
                }
                TypeSystemDefinition::Directive(_) => {}
            }
        }

        for extension in extensions {
            let info = types.get_mut(&extension.name.node).ok_or_else(|| {
                CostError::InvalidSchema(format!(
                    "Cannot extend type \"{}\" because it is not defined",
                    extension.name.node
                ))
            })?;
            if info.kind != kind_of(&extension.kind) {
                return Err(CostError::InvalidSchema(format!(
                    "Extension of type \"{}\" does not match its kind",
                    extension.name.node
                )));
            }
            merge_definition(info, extension);
        }

        let [query, mutation, subscription] = roots;
        let default_root = |explicit: Option<Name>, fallback: &str| {
            explicit.or_else(|| types.contains_key(fallback).then(|| Name::new(fallback)))
        };

        Ok(Self {
            query_type: default_root(query, "Query"),
            mutation_type: default_root(mutation, "Mutation"),
            subscription_type: default_root(subscription, "Subscription"),
            types,
        })
    }

    pub fn type_by_name(&self, name: &str) -> Option<&TypeInfo> {
        self.types.get(name)
    }

    /// Root type for an operation kind, if the schema declares one
    pub fn root_type(&self, operation: OperationType) -> Option<&TypeInfo> {
        let name = match operation {
            OperationType::Query => self.query_type.as_ref(),
            OperationType::Mutation => self.mutation_type.as_ref(),
            OperationType::Subscription => self.subscription_type.as_ref(),
        }?;
        self.types.get(name)
    }
}

/// Strip list and non-null wrappers from a type reference
pub fn named_type(ty: &Type) -> &Name {
    match &ty.base {
        BaseType::Named(name) => name,
        BaseType::List(inner) => named_type(inner),
    }
}

fn find_directive<'a>(directives: &'a [ConstDirective], name: &str) -> Option<&'a ConstDirective> {
    directives
        .iter()
        .find(|directive| directive.name.node.as_str() == name)
}

fn kind_of(kind: &AstTypeKind) -> TypeKind {
    match kind {
        AstTypeKind::Scalar => TypeKind::Scalar,
        AstTypeKind::Object(_) => TypeKind::Object,
        AstTypeKind::Interface(_) => TypeKind::Interface,
        AstTypeKind::Union(_) => TypeKind::Union,
        AstTypeKind::Enum(_) => TypeKind::Enum,
        AstTypeKind::InputObject(_) => TypeKind::InputObject,
    }
}

fn merge_definition(info: &mut TypeInfo, definition: &TypeDefinition) {
    info.directives
        .extend(definition.directives.iter().map(|d| d.node.clone()));

    let fields = match &definition.kind {
        AstTypeKind::Object(object) => &object.fields,
        AstTypeKind::Interface(interface) => &interface.fields,
        AstTypeKind::InputObject(input) => {
            info.input_fields.extend(
                input
                    .fields
                    .iter()
                    .map(|field| (field.node.name.node.clone(), ArgumentInfo::from(&field.node))),
            );
            return;
        }
        AstTypeKind::Enum(enum_type) => {
            info.enum_values
                .extend(enum_type.values.iter().map(|v| v.node.value.node.clone()));
            return;
        }
        AstTypeKind::Scalar | AstTypeKind::Union(_) => return,
    };

    for field in fields {
        let field = &field.node;
        info.fields.insert(
            field.name.node.clone(),
            FieldInfo {
                name: field.name.node.clone(),
                arguments: field
                    .arguments
                    .iter()
                    .map(|arg: &Positioned<InputValueDefinition>| {
                        (arg.node.name.node.clone(), ArgumentInfo::from(&arg.node))
                    })
                    .collect(),
                ty: field.ty.node.clone(),
                directives: field.directives.iter().map(|d| d.node.clone()).collect(),
            },
        );
    }
}
