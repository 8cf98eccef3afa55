//! Call-time argument coercion
//!
//! Resolves the arguments written on a field selection into concrete values:
//! variables are substituted, defaults applied and values checked against
//! the declared argument types.

use async_graphql_parser::types::{BaseType, Field, Type};
use async_graphql_value::{ConstValue, Name, Value, Variables};
use indexmap::IndexMap;

use crate::schema::{FieldInfo, SchemaIndex, TypeKind};
use crate::{CostError, Result};

/// Coerced argument values of one field selection, keyed by argument name
pub type ArgumentValues = IndexMap<Name, ConstValue>;

/// Coerce the arguments of `field` against its definition
///
/// Arguments that are neither provided nor defaulted are left out of the
/// result, mirroring how an executor hands arguments to a resolver.
pub fn coerce_arguments(
    schema: &SchemaIndex,
    definition: &FieldInfo,
    field: &Field,
    variables: &Variables,
) -> Result<ArgumentValues> {
    if let Some((name, _)) = field
        .arguments
        .iter()
        .find(|(name, _)| !definition.arguments.contains_key(&name.node))
    {
        return Err(CostError::ArgumentCoercion(format!(
            "Unknown argument \"{}\" on field \"{}\"",
            name.node, definition.name
        )));
    }

    let mut values = ArgumentValues::new();
    for argument in definition.arguments.values() {
        let provided = field.get_argument(&argument.name).map(|value| &value.node);

        let value = match provided {
            Some(Value::Variable(variable)) => match variables.get(variable) {
                Some(value) => Some(value.clone()),
                None if argument.default_value.is_some() => argument.default_value.clone(),
                None if !argument.ty.nullable => {
                    return Err(CostError::ArgumentCoercion(format!(
                        "Argument \"{}\" of required type \"{}\" was provided the variable \"${}\" which was not provided a runtime value",
                        argument.name, argument.ty, variable
                    )));
                }
                None => None,
            },
            Some(value) => Some(
                value
                    .clone()
                    .into_const_with(|name| {
                        Ok::<_, std::convert::Infallible>(
                            variables.get(&name).cloned().unwrap_or(ConstValue::Null),
                        )
                    })
                    .unwrap_or(ConstValue::Null),
            ),
            None if argument.default_value.is_some() => argument.default_value.clone(),
            None if !argument.ty.nullable => {
                return Err(CostError::ArgumentCoercion(format!(
                    "Argument \"{}\" of required type \"{}\" was not provided",
                    argument.name, argument.ty
                )));
            }
            None => None,
        };

        if let Some(value) = value {
            let value = coerce_value(schema, value, &argument.ty).map_err(|reason| {
                CostError::ArgumentCoercion(format!(
                    "Argument \"{}\" has invalid value: {}",
                    argument.name, reason
                ))
            })?;
            values.insert(argument.name.clone(), value);
        }
    }

    Ok(values)
}

/// Coerce a single input value to `ty`, returning a reason on mismatch
pub(crate) fn coerce_value(
    schema: &SchemaIndex,
    value: ConstValue,
    ty: &Type,
) -> std::result::Result<ConstValue, String> {
    if value == ConstValue::Null {
        return if ty.nullable {
            Ok(ConstValue::Null)
        } else {
            Err(format!("expected type \"{}\", found null", ty))
        };
    }

    match &ty.base {
        BaseType::List(item_type) => match value {
            ConstValue::List(items) => items
                .into_iter()
                .map(|item| coerce_value(schema, item, item_type))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(ConstValue::List),
            value => Ok(ConstValue::List(vec![coerce_value(schema, value, item_type)?])),
        },
        BaseType::Named(name) => coerce_named(schema, value, name),
    }
}

fn coerce_named(
    schema: &SchemaIndex,
    value: ConstValue,
    type_name: &Name,
) -> std::result::Result<ConstValue, String> {
    let mismatch = |value: &ConstValue| format!("expected type \"{}\", found {}", type_name, value);

    match type_name.as_str() {
        "Int" => match &value {
            ConstValue::Number(n)
                if n.as_i64().is_some_and(|i| i32::try_from(i).is_ok()) =>
            {
                Ok(value)
            }
            _ => Err(mismatch(&value)),
        },
        "Float" => match &value {
            ConstValue::Number(_) => Ok(value),
            _ => Err(mismatch(&value)),
        },
        "String" => match &value {
            ConstValue::String(_) => Ok(value),
            _ => Err(mismatch(&value)),
        },
        "Boolean" => match &value {
            ConstValue::Boolean(_) => Ok(value),
            _ => Err(mismatch(&value)),
        },
        "ID" => match &value {
            ConstValue::String(_) => Ok(value),
            ConstValue::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
            _ => Err(mismatch(&value)),
        },
        _ => {
            let Some(info) = schema.type_by_name(type_name) else {
                return Ok(value);
            };
            match info.kind {
                TypeKind::Enum => {
                    let variant = match &value {
                        ConstValue::Enum(name) => Some(name.as_str()),
                        ConstValue::String(s) => Some(s.as_str()),
                        _ => None,
                    };
                    match variant {
                        Some(v) if info.enum_values.iter().any(|e| e.as_str() == v) => {
                            Ok(ConstValue::Enum(Name::new(v)))
                        }
                        _ => Err(mismatch(&value)),
                    }
                }
                TypeKind::InputObject => {
                    let mut fields = match value {
                        ConstValue::Object(fields) => fields,
                        other => return Err(mismatch(&other)),
                    };
                    if let Some(unknown) = fields.keys().find(|k| !info.input_fields.contains_key(*k)) {
                        return Err(format!(
                            "field \"{}\" is not defined by type \"{}\"",
                            unknown, type_name
                        ));
                    }
                    let mut coerced = IndexMap::new();
                    for input_field in info.input_fields.values() {
                        let field_value = fields
                            .shift_remove(&input_field.name)
                            .or_else(|| input_field.default_value.clone());
                        match field_value {
                            Some(v) => {
                                coerced.insert(
                                    input_field.name.clone(),
                                    coerce_value(schema, v, &input_field.ty)?,
                                );
                            }
                            None if !input_field.ty.nullable => {
                                return Err(format!(
                                    "field \"{}.{}\" of required type \"{}\" was not provided",
                                    type_name, input_field.name, input_field.ty
                                ));
                            }
                            None => {}
                        }
                    }
                    Ok(ConstValue::Object(coerced))
                }
                TypeKind::Scalar => Ok(value),
                TypeKind::Object | TypeKind::Interface | TypeKind::Union => Err(format!(
                    "type \"{}\" is not an input type",
                    type_name
                )),
            }
        }
    }
}
