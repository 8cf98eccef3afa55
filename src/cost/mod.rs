//! Query cost analysis
//!
//! Costs are declared either in a schema-external [`CostMap`] or with
//! `@cost` directives in the SDL. The two are alternatives: when a cost map
//! is configured, directives are never consulted.
//!
//! ## Usage
//!
//! ```rust
//! use graphql_query_cost::cost::{cost_validator, CostValidatorConfig};
//! use graphql_query_cost::{validate, SchemaIndex};
//!
//! let schema = SchemaIndex::parse(
//!     "type Query { users(first: Int): [User!]! } type User { name: String }",
//! ).unwrap();
//! let config = CostValidatorConfig::from_json(serde_json::json!({
//!     "maximum_cost": 10,
//!     "cost_map": { "Query": { "users": { "complexity": 1, "multipliers": ["first"] } } }
//! })).unwrap();
//!
//! let document = async_graphql_parser::parse_query("{ users(first: 50) { name } }").unwrap();
//! let mut validator = cost_validator(config);
//! let errors = validate(&schema, &document, &mut [&mut validator]);
//! assert_eq!(errors[0].message, "The query exceeds the maximum cost of 10. Actual cost is 50");
//! ```

mod declaration;
mod multipliers;
mod validator;

pub use declaration::{CostDeclaration, FieldCostSpec};
pub use multipliers::resolve_multipliers;
pub use validator::CostValidator;

use async_graphql_value::Variables;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::schema::SchemaIndex;
use crate::{CostError, Result};

/// SDL definition of the `@cost` directive, for inclusion in user schemas
pub const COST_DIRECTIVE_SDL: &str = "directive @cost(complexity: Int, multipliers: [String!], useMultipliers: Boolean) on OBJECT | FIELD_DEFINITION";

/// Cost declaration of one field in a [`CostMap`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<i64>,

    /// Argument paths (`"first"`, `"filter.ids"`) whose values scale the cost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multipliers: Option<Vec<String>>,

    #[serde(
        default,
        alias = "useMultipliers",
        skip_serializing_if = "Option::is_none"
    )]
    pub use_multipliers: Option<bool>,
}

impl CostSpec {
    /// Declaration with a fixed complexity and no multipliers
    pub fn new(complexity: i64) -> Self {
        Self {
            complexity: Some(complexity),
            ..Self::default()
        }
    }

    /// Scale the cost by the values of these argument paths
    pub fn with_multipliers<I, S>(mut self, multipliers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.multipliers = Some(multipliers.into_iter().map(Into::into).collect());
        self
    }

    /// Turn multiplier scaling on or off for this field and its subtree
    pub fn with_use_multipliers(mut self, use_multipliers: bool) -> Self {
        self.use_multipliers = Some(use_multipliers);
        self
    }
}

/// Cost declarations keyed by type name, then field name
pub type CostMap = IndexMap<String, IndexMap<String, CostSpec>>;

fn default_complexity() -> i64 {
    1
}

/// Configuration of one cost validation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostValidatorConfig {
    /// Costs strictly above this value are rejected
    pub maximum_cost: i64,

    /// Cost of a field that has no cost declaration
    #[serde(default)]
    pub default_cost: i64,

    /// Complexity of a declaration that does not state one
    #[serde(default = "default_complexity")]
    pub default_complexity: i64,

    /// Variable values bound for the request
    #[serde(default)]
    pub variables: Variables,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_map: Option<CostMap>,
}

impl CostValidatorConfig {
    /// Configuration rejecting operations that cost more than `maximum_cost`
    pub fn new(maximum_cost: i64) -> Self {
        Self {
            maximum_cost,
            default_cost: 0,
            default_complexity: default_complexity(),
            variables: Variables::default(),
            cost_map: None,
        }
    }

    /// Load configuration from a JSON value
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| CostError::Configuration(e.to_string()))
    }

    /// Set the cost of fields without a declaration
    pub fn default_cost(mut self, default_cost: i64) -> Self {
        self.default_cost = default_cost;
        self
    }

    /// Set the complexity used when a declaration omits one
    pub fn default_complexity(mut self, default_complexity: i64) -> Self {
        self.default_complexity = default_complexity;
        self
    }

    /// Bind variable values used to resolve multipliers
    pub fn variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    /// Declare costs with a cost map instead of `@cost` directives
    pub fn cost_map(mut self, cost_map: CostMap) -> Self {
        self.cost_map = Some(cost_map);
        self
    }
}

/// Check that every type and field named by `cost_map` exists in `schema`
///
/// Only object types may carry cost-map entries. The first problem found, in
/// declaration order, is returned.
pub fn validate_cost_map(cost_map: &CostMap, schema: &SchemaIndex) -> Result<()> {
    for (type_name, fields) in cost_map {
        let Some(schema_type) = schema.type_by_name(type_name) else {
            return Err(CostError::Configuration(format!(
                "The query cost could not be calculated because cost map specifies a type {} that is not defined in the schema.",
                type_name
            )));
        };

        if !schema_type.is_object() {
            return Err(CostError::Configuration(format!(
                "The query cost could not be calculated because cost map specifies a type {} that is defined in the schema, but is not an object type.",
                type_name
            )));
        }

        if let Some(field_name) = fields.keys().find(|field| schema_type.field(field).is_none()) {
            return Err(CostError::Configuration(format!(
                "The query cost could not be calculated because cost map contains a field {} not defined in the {} type.",
                field_name, type_name
            )));
        }
    }

    Ok(())
}

/// Create a cost validation rule for one document
pub fn cost_validator(config: CostValidatorConfig) -> CostValidator {
    CostValidator::new(config)
}
