//! Validation rule protocol
//!
//! A minimal rule-driver in the shape the cost validator needs: rules are
//! called once when an operation definition is entered and once when it is
//! left, and report problems into a shared [`ValidationContext`] instead of
//! failing.

use async_graphql::{ErrorExtensionValues, ServerError};
use async_graphql_parser::types::{ExecutableDocument, FragmentDefinition, OperationDefinition};
use async_graphql_parser::{Pos, Positioned};
use async_graphql_value::{ConstValue, Name};
use serde::Serialize;

use crate::schema::SchemaIndex;
use crate::CostError;

/// A non-fatal validation error collected while walking a document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleError {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Pos>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ErrorExtensionValues>,
}

impl RuleError {
    pub fn new(message: impl Into<String>, locations: Vec<Pos>) -> Self {
        Self {
            message: message.into(),
            locations,
            extensions: None,
        }
    }

    /// Build a rule error from a crate error reported at `pos`
    ///
    /// Cost overruns carry a machine-readable `cost` extension with the
    /// requested and available budget.
    pub fn from_cost_error(error: &CostError, pos: Pos) -> Self {
        let mut rule_error = Self::new(error.to_string(), vec![pos]);
        if let CostError::CostExceeded { maximum, actual } = error {
            let mut extensions = ErrorExtensionValues::default();
            extensions.set(
                "cost",
                ConstValue::Object(
                    [
                        (Name::new("requestedQueryCost"), ConstValue::Number((*actual).into())),
                        (Name::new("maximumAvailable"), ConstValue::Number((*maximum).into())),
                    ]
                    .into_iter()
                    .collect(),
                ),
            );
            rule_error.extensions = Some(extensions);
        }
        rule_error
    }
}

impl From<RuleError> for ServerError {
    fn from(error: RuleError) -> Self {
        let mut server_error = ServerError::new(error.message, None);
        server_error.locations = error.locations;
        server_error.extensions = error.extensions;
        server_error
    }
}

/// State shared by all rules during one validation pass
pub struct ValidationContext<'a> {
    schema: &'a SchemaIndex,
    document: &'a ExecutableDocument,
    errors: Vec<RuleError>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(schema: &'a SchemaIndex, document: &'a ExecutableDocument) -> Self {
        Self {
            schema,
            document,
            errors: Vec::new(),
        }
    }

    pub fn schema(&self) -> &'a SchemaIndex {
        self.schema
    }

    /// Look up a fragment definition by name
    pub fn fragment(&self, name: &str) -> Option<&'a Positioned<FragmentDefinition>> {
        self.document.fragments.get(name)
    }

    /// Record a non-fatal error; validation carries on
    pub fn report_error(&mut self, error: RuleError) {
        self.errors.push(error);
    }

    pub fn into_errors(self) -> Vec<RuleError> {
        self.errors
    }
}

/// A check run against a parsed document before execution
///
/// Both hooks are invoked exactly once per operation definition, in
/// document order; `leave_operation_definition` runs after every rule has
/// entered the operation.
pub trait ValidationRule {
    fn enter_operation_definition(
        &mut self,
        _ctx: &mut ValidationContext<'_>,
        _name: Option<&Name>,
        _operation: &Positioned<OperationDefinition>,
    ) {
    }

    fn leave_operation_definition(
        &mut self,
        _ctx: &mut ValidationContext<'_>,
        _name: Option<&Name>,
        _operation: &Positioned<OperationDefinition>,
    ) {
    }
}

/// Run `rules` over every operation of `document`, returning collected errors
pub fn validate(
    schema: &SchemaIndex,
    document: &ExecutableDocument,
    rules: &mut [&mut dyn ValidationRule],
) -> Vec<RuleError> {
    let mut ctx = ValidationContext::new(schema, document);

    for (name, operation) in document.operations.iter() {
        for rule in rules.iter_mut() {
            rule.enter_operation_definition(&mut ctx, name, operation);
        }
        for rule in rules.iter_mut() {
            rule.leave_operation_definition(&mut ctx, name, operation);
        }
    }

    ctx.into_errors()
}
