//! Axum handler for serving a cost-checked schema over HTTP
//!
//! The handler only moves JSON requests in and out; cost analysis happens
//! inside the schema through the [`QueryCost`](crate::QueryCost) extension.

use async_graphql::{ObjectType, Request, Response, Schema, SubscriptionType};
use axum::{extract::Extension, routing::post, Json, Router};

/// Standard GraphQL POST handler
///
/// # Example
///
/// ```rust,no_run
/// use async_graphql::{EmptyMutation, EmptySubscription, Object, Schema};
/// use axum::{routing::post, Extension, Router};
/// use graphql_query_cost::handler::graphql_handler;
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
/// let schema = Schema::new(Query, EmptyMutation, EmptySubscription);
/// let app: Router = Router::new()
///     .route("/graphql", post(graphql_handler::<Query, EmptyMutation, EmptySubscription>))
///     .layer(Extension(schema));
/// ```
pub async fn graphql_handler<Query, Mutation, Subscription>(
    Extension(schema): Extension<Schema<Query, Mutation, Subscription>>,
    Json(request): Json<Request>,
) -> Json<Response>
where
    Query: ObjectType + 'static,
    Mutation: ObjectType + 'static,
    Subscription: SubscriptionType + 'static,
{
    let operation = request.operation_name.clone();
    let response = schema.execute(request).await;

    if response.is_err() {
        tracing::debug!(
            operation = operation.as_deref().unwrap_or("<anonymous>"),
            errors = response.errors.len(),
            "GraphQL request finished with errors"
        );
    }

    Json(response)
}

/// Router serving `schema` on `path` via [`graphql_handler`]
pub fn graphql_router<Query, Mutation, Subscription>(
    schema: Schema<Query, Mutation, Subscription>,
    path: &str,
) -> Router
where
    Query: ObjectType + 'static,
    Mutation: ObjectType + 'static,
    Subscription: SubscriptionType + 'static,
{
    Router::new()
        .route(path, post(graphql_handler::<Query, Mutation, Subscription>))
        .layer(Extension(schema))
}
