//! # graphql-query-cost
//!
//! Query cost validation for GraphQL services.
//!
//! ## Features
//!
//! - **Cost Maps** - Declare per-field costs outside the schema
//! - **Cost Directives** - Or declare them in SDL with `@cost`
//! - **Multipliers** - Scale costs by pagination and list arguments
//! - **Validation Rule** - Reject operations above a maximum cost
//! - **async-graphql Extension** - Cost every request a schema executes
//! - **Axum Handler** - Serve a cost-checked schema over HTTP
//!
//! ## Usage
//!
//! ```rust
//! use graphql_query_cost::{cost_validator, validate, CostValidatorConfig, SchemaIndex};
//!
//! let schema = SchemaIndex::parse(r#"
//!     type Query {
//!         posts(first: Int): [Post!]! @cost(complexity: 2, multipliers: ["first"])
//!     }
//!     type Post { title: String }
//! "#).unwrap();
//! let document = async_graphql_parser::parse_query("{ posts(first: 10) { title } }").unwrap();
//!
//! let mut validator = cost_validator(CostValidatorConfig::new(100));
//! let errors = validate(&schema, &document, &mut [&mut validator]);
//! assert!(errors.is_empty());
//! assert_eq!(validator.cost(), 20);
//! ```

pub mod arguments;
pub mod cost;
pub mod extension;
pub mod handler;
pub mod schema;
pub mod validation;

pub use arguments::{coerce_arguments, ArgumentValues};
pub use cost::{
    cost_validator, validate_cost_map, CostMap, CostSpec, CostValidator, CostValidatorConfig,
    COST_DIRECTIVE_SDL,
};
pub use extension::QueryCost;
pub use handler::{graphql_handler, graphql_router};
pub use schema::{FieldInfo, SchemaIndex, TypeInfo, TypeKind};
pub use validation::{validate, RuleError, ValidationContext, ValidationRule};

use thiserror::Error;

/// Query cost errors
#[derive(Error, Debug)]
pub enum CostError {
    #[error("Failed to parse schema: {0}")]
    SchemaParse(#[from] async_graphql_parser::Error),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    ArgumentCoercion(String),

    #[error("The query exceeds the maximum cost of {maximum}. Actual cost is {actual}")]
    CostExceeded { maximum: i64, actual: i64 },
}

/// Result type for query cost operations
pub type Result<T> = std::result::Result<T, CostError>;
