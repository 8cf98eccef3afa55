use async_graphql_parser::types::ConstDirective;
use async_graphql_value::ConstValue;

use super::multipliers::resolve_multipliers;
use super::{CostMap, CostSpec};
use crate::arguments::ArgumentValues;
use crate::schema::{FieldInfo, SchemaIndex, TypeInfo};

const COST_DIRECTIVE: &str = "cost";

/// Cost declared for a field, before its call-time arguments are known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostDeclaration {
    pub complexity: Option<i64>,
    pub multipliers: Vec<String>,
    pub use_multipliers: bool,
}

/// Cost of a single field occurrence, with multipliers resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCostSpec {
    pub complexity: Option<i64>,
    pub multipliers: Vec<i64>,
    pub use_multipliers: bool,
}

impl From<&CostSpec> for CostDeclaration {
    fn from(spec: &CostSpec) -> Self {
        Self {
            complexity: spec.complexity,
            multipliers: spec.multipliers.clone().unwrap_or_default(),
            use_multipliers: spec.use_multipliers.unwrap_or(true),
        }
    }
}

impl CostDeclaration {
    /// Read a `@cost(complexity:, multipliers:, useMultipliers:)` directive
    ///
    /// A directive without arguments declares nothing. Arguments of the
    /// wrong literal kind are ignored rather than rejected.
    pub fn from_directive(directive: &ConstDirective) -> Option<Self> {
        if directive.arguments.is_empty() {
            return None;
        }

        let argument = |name: &str| directive.get_argument(name).map(|value| &value.node);

        let complexity = match argument("complexity") {
            Some(ConstValue::Number(n)) => n.as_i64(),
            _ => None,
        };
        let use_multipliers = match argument("useMultipliers") {
            Some(ConstValue::Boolean(b)) => *b,
            _ => true,
        };
        let multipliers = match argument("multipliers") {
            Some(ConstValue::List(items)) => items
                .iter()
                .filter_map(|item| match item {
                    ConstValue::String(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        Some(Self {
            complexity,
            multipliers,
            use_multipliers,
        })
    }

    /// Resolve multiplier names against the field's coerced arguments
    pub fn resolve(&self, arguments: &ArgumentValues) -> FieldCostSpec {
        FieldCostSpec {
            complexity: self.complexity,
            multipliers: resolve_multipliers(&self.multipliers, arguments),
            use_multipliers: self.use_multipliers,
        }
    }
}

/// Find the cost declaration that applies to `field` selected on `parent_type`
///
/// With a cost map only the map is consulted. Otherwise a `@cost` on the
/// field definition wins over a `@cost` on the field's object return type.
pub(crate) fn declared_cost(
    cost_map: Option<&CostMap>,
    schema: &SchemaIndex,
    parent_type: &TypeInfo,
    field: &FieldInfo,
) -> Option<CostDeclaration> {
    if let Some(cost_map) = cost_map {
        return cost_map
            .get(parent_type.name.as_str())
            .and_then(|fields| fields.get(field.name.as_str()))
            .map(CostDeclaration::from);
    }

    field
        .directive(COST_DIRECTIVE)
        .and_then(CostDeclaration::from_directive)
        .or_else(|| {
            schema
                .type_by_name(field.named_type())
                .filter(|return_type| return_type.is_object())
                .and_then(|return_type| return_type.directive(COST_DIRECTIVE))
                .and_then(CostDeclaration::from_directive)
        })
}
