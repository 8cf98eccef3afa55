//! async-graphql integration
//!
//! [`QueryCost`] plugs the cost validator into an `async_graphql::Schema` so
//! every executed request is costed before its resolvers run.

use std::sync::Arc;

use async_graphql::extensions::{
    Extension, ExtensionContext, ExtensionFactory, NextParseQuery, NextValidation,
};
use async_graphql::parser::types::ExecutableDocument;
use async_graphql::{ServerError, ServerResult, ValidationResult, Variables};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::cost::{CostValidator, CostValidatorConfig};
use crate::schema::SchemaIndex;
use crate::validation::validate;

/// Query cost extension factory
///
/// The configured variables act as fallbacks; each request's own variables
/// take precedence.
///
/// # Example
///
/// ```rust,no_run
/// use async_graphql::{EmptyMutation, EmptySubscription, Object, Schema};
/// use graphql_query_cost::{CostValidatorConfig, QueryCost};
///
/// struct Query;
///
/// #[Object]
/// impl Query {
///     async fn hello(&self) -> &str {
///         "world"
///     }
/// }
///
/// let sdl = Schema::new(Query, EmptyMutation, EmptySubscription).sdl();
/// let schema = Schema::build(Query, EmptyMutation, EmptySubscription)
///     .extension(QueryCost::from_sdl(&sdl, CostValidatorConfig::new(1000)).unwrap())
///     .finish();
/// ```
#[derive(Clone)]
pub struct QueryCost {
    schema: Arc<SchemaIndex>,
    config: Arc<CostValidatorConfig>,
}

impl QueryCost {
    pub fn new(schema: SchemaIndex, config: CostValidatorConfig) -> Self {
        Self {
            schema: Arc::new(schema),
            config: Arc::new(config),
        }
    }

    /// Build the extension from the schema SDL
    pub fn from_sdl(sdl: &str, config: CostValidatorConfig) -> crate::Result<Self> {
        Ok(Self::new(SchemaIndex::parse(sdl)?, config))
    }
}

impl ExtensionFactory for QueryCost {
    fn create(&self) -> Arc<dyn Extension> {
        Arc::new(QueryCostExtension {
            schema: self.schema.clone(),
            config: self.config.clone(),
            pending: Mutex::new(None),
        })
    }
}

struct QueryCostExtension {
    schema: Arc<SchemaIndex>,
    config: Arc<CostValidatorConfig>,
    pending: Mutex<Option<(ExecutableDocument, Variables)>>,
}

impl QueryCostExtension {
    fn check(&self, document: &ExecutableDocument, variables: &Variables) -> Vec<ServerError> {
        let mut config = (*self.config).clone();
        config
            .variables
            .extend(variables.iter().map(|(name, value)| (name.clone(), value.clone())));

        let mut validator = CostValidator::new(config);
        let errors = validate(&self.schema, document, &mut [&mut validator]);
        if !errors.is_empty() {
            tracing::info!(
                cost = validator.cost(),
                maximum_cost = self.config.maximum_cost,
                errors = errors.len(),
                "rejecting request after cost analysis"
            );
        }

        errors.into_iter().map(ServerError::from).collect()
    }
}

#[async_trait]
impl Extension for QueryCostExtension {
    async fn parse_query(
        &self,
        ctx: &ExtensionContext<'_>,
        query: &str,
        variables: &Variables,
        next: NextParseQuery<'_>,
    ) -> ServerResult<ExecutableDocument> {
        let document = next.run(ctx, query, variables).await?;
        *self.pending.lock().await = Some((document.clone(), variables.clone()));
        Ok(document)
    }

    async fn validation(
        &self,
        ctx: &ExtensionContext<'_>,
        next: NextValidation<'_>,
    ) -> Result<ValidationResult, Vec<ServerError>> {
        // Cost only documents the engine itself accepted.
        let result = next.run(ctx).await?;

        let Some((document, variables)) = self.pending.lock().await.take() else {
            return Ok(result);
        };
        let errors = self.check(&document, &variables);
        if errors.is_empty() {
            Ok(result)
        } else {
            Err(errors)
        }
    }
}
