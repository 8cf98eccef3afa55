use std::collections::HashMap;
use std::ops::Add;

use async_graphql_parser::types::{Field, OperationDefinition, Selection, SelectionSet};
use async_graphql_parser::{Pos, Positioned};
use async_graphql_value::{Name, Variables};

use super::declaration::{declared_cost, FieldCostSpec};
use super::{validate_cost_map, CostValidatorConfig};
use crate::arguments::{coerce_arguments, ArgumentValues};
use crate::schema::TypeInfo;
use crate::validation::{RuleError, ValidationContext, ValidationRule};
use crate::CostError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Configuration {
    Unchecked,
    Valid,
    Invalid,
}

/// Cost of a selection relative to the multiplier stack enclosing it
///
/// A stack only ever scales the fields that use multipliers, and it does so
/// by the product of its entries. Under a stack whose product is `p` the
/// selection costs `scaled * p + fixed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Cost {
    scaled: i64,
    fixed: i64,
}

impl Cost {
    fn scaled(cost: i64) -> Self {
        Self {
            scaled: cost,
            fixed: 0,
        }
    }

    fn fixed(cost: i64) -> Self {
        Self {
            scaled: 0,
            fixed: cost,
        }
    }

    /// Push `multiplier` onto the stack enclosing this selection
    fn multiply(self, multiplier: i64) -> Self {
        Self {
            scaled: self.scaled.saturating_mul(multiplier),
            fixed: self.fixed,
        }
    }

    /// Cost under a stack whose entries multiply to `product`
    fn total(self, product: i64) -> i64 {
        self.scaled.saturating_mul(product).saturating_add(self.fixed)
    }
}

impl Add for Cost {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            scaled: self.scaled.saturating_add(other.scaled),
            fixed: self.fixed.saturating_add(other.fixed),
        }
    }
}

/// Validation rule rejecting operations whose estimated cost is too high
///
/// One instance validates one document. Every operation entered adds its
/// cost to the running total, which is compared to the maximum when the
/// operation is left.
pub struct CostValidator {
    config: CostValidatorConfig,
    cost: i64,
    configuration: Configuration,
    fragment_path: Vec<Name>,
    fragment_costs: HashMap<Name, Cost>,
}

impl CostValidator {
    /// Validator with a zero running cost
    pub fn new(config: CostValidatorConfig) -> Self {
        Self {
            config,
            cost: 0,
            configuration: Configuration::Unchecked,
            fragment_path: Vec::new(),
            fragment_costs: HashMap::new(),
        }
    }

    /// Cost accumulated so far
    pub fn cost(&self) -> i64 {
        self.cost
    }

    /// Validate the cost map against the schema the first time it is needed
    fn check_configuration(&mut self, ctx: &mut ValidationContext<'_>, pos: Pos) -> bool {
        if self.configuration == Configuration::Unchecked {
            let checked = match &self.config.cost_map {
                Some(cost_map) => validate_cost_map(cost_map, ctx.schema()),
                None => Ok(()),
            };
            self.configuration = match checked {
                Ok(()) => Configuration::Valid,
                Err(err) => {
                    tracing::warn!(error = %err, "cost map does not match the schema");
                    ctx.report_error(RuleError::from_cost_error(&err, pos));
                    Configuration::Invalid
                }
            };
        }
        self.configuration == Configuration::Valid
    }

    /// Bound variables plus defaults declared by the operation itself
    fn operation_variables(&self, operation: &OperationDefinition) -> Variables {
        let mut variables = self.config.variables.clone();
        for definition in &operation.variable_definitions {
            let definition = &definition.node;
            if let Some(default) = &definition.default_value {
                variables
                    .entry(definition.name.node.clone())
                    .or_insert_with(|| default.node.clone());
            }
        }
        variables
    }

    /// Cost of a declared field wrapping the cost of its children
    ///
    /// With multipliers in use, the sum of the field's own multipliers is
    /// pushed onto the stack for both its complexity and its subtree.
    /// Otherwise the complexity is charged as is and the children see the
    /// enclosing stack unchanged.
    fn compute_cost(&self, spec: &FieldCostSpec, children: Cost) -> Cost {
        let complexity = spec.complexity.unwrap_or(self.config.default_complexity);
        if !spec.use_multipliers {
            return Cost::fixed(complexity) + children;
        }

        let multiplier = if spec.multipliers.is_empty() {
            1
        } else {
            spec.multipliers
                .iter()
                .fold(0i64, |sum, multiplier| sum.saturating_add(*multiplier))
        };
        (Cost::scaled(complexity) + children).multiply(multiplier)
    }

    fn selection_set_cost(
        &mut self,
        ctx: &mut ValidationContext<'_>,
        variables: &Variables,
        selection_set: &SelectionSet,
        parent_type: Option<&TypeInfo>,
    ) -> Cost {
        let mut total = Cost::default();

        for selection in &selection_set.items {
            let cost = match &selection.node {
                Selection::Field(field) => self.field_cost(ctx, variables, field, parent_type),
                Selection::FragmentSpread(spread) => {
                    self.fragment_cost(ctx, variables, &spread.node.fragment_name.node)
                }
                Selection::InlineFragment(inline) => {
                    let fragment_type = match &inline.node.type_condition {
                        Some(condition) => ctx.schema().type_by_name(&condition.node.on.node),
                        None => parent_type,
                    };
                    self.selection_set_cost(
                        ctx,
                        variables,
                        &inline.node.selection_set.node,
                        fragment_type,
                    )
                }
            };
            total = total + cost;
        }

        total
    }

    /// Cost of a named fragment, computed once per operation
    fn fragment_cost(
        &mut self,
        ctx: &mut ValidationContext<'_>,
        variables: &Variables,
        name: &Name,
    ) -> Cost {
        if let Some(cost) = self.fragment_costs.get(name) {
            return *cost;
        }
        // Re-entering a fragment that is being expanded adds nothing.
        if self.fragment_path.contains(name) {
            return Cost::default();
        }
        let Some(fragment) = ctx.fragment(name) else {
            return Cost::fixed(self.config.default_cost);
        };

        let fragment_type = ctx
            .schema()
            .type_by_name(&fragment.node.type_condition.node.on.node);
        self.fragment_path.push(name.clone());
        let cost = self.selection_set_cost(
            ctx,
            variables,
            &fragment.node.selection_set.node,
            fragment_type,
        );
        self.fragment_path.pop();

        self.fragment_costs.insert(name.clone(), cost);
        cost
    }

    fn field_cost(
        &mut self,
        ctx: &mut ValidationContext<'_>,
        variables: &Variables,
        field: &Positioned<Field>,
        parent_type: Option<&TypeInfo>,
    ) -> Cost {
        // Unknown fields are left to the engine's own validation.
        let Some((parent_type, definition)) = parent_type
            .and_then(|ty| ty.field(&field.node.name.node).map(|definition| (ty, definition)))
        else {
            return Cost::default();
        };
        let schema = ctx.schema();

        let arguments = match coerce_arguments(schema, definition, &field.node, variables) {
            Ok(arguments) => arguments,
            Err(err) => {
                tracing::warn!(field = %definition.name, error = %err, "could not coerce field arguments");
                ctx.report_error(RuleError::from_cost_error(&err, field.pos));
                ArgumentValues::new()
            }
        };
        let spec = declared_cost(self.config.cost_map.as_ref(), schema, parent_type, definition)
            .map(|declaration| declaration.resolve(&arguments));

        let children = self.selection_set_cost(
            ctx,
            variables,
            &field.node.selection_set.node,
            schema.type_by_name(definition.named_type()),
        );

        let cost = match &spec {
            Some(spec) => self.compute_cost(spec, children),
            None => Cost::fixed(self.config.default_cost) + children,
        };
        tracing::debug!(
            "Field {}.{} cost breakdown: {} per multiplier unit + {} fixed, own multipliers {:?}",
            parent_type.name,
            definition.name,
            cost.scaled,
            cost.fixed,
            spec.as_ref().map(|spec| &spec.multipliers)
        );
        cost
    }
}

impl ValidationRule for CostValidator {
    fn enter_operation_definition(
        &mut self,
        ctx: &mut ValidationContext<'_>,
        name: Option<&Name>,
        operation: &Positioned<OperationDefinition>,
    ) {
        if !self.check_configuration(ctx, operation.pos) {
            return;
        }

        // Fragment costs depend on the operation's variables.
        self.fragment_costs.clear();

        let root_type = ctx.schema().root_type(operation.node.ty);
        let variables = self.operation_variables(&operation.node);
        let cost = self
            .selection_set_cost(ctx, &variables, &operation.node.selection_set.node, root_type)
            .total(1);

        tracing::debug!(
            operation = name.map(|n| n.as_str()).unwrap_or("<anonymous>"),
            cost,
            "computed operation cost"
        );
        self.cost = self.cost.saturating_add(cost);
    }

    fn leave_operation_definition(
        &mut self,
        ctx: &mut ValidationContext<'_>,
        _name: Option<&Name>,
        operation: &Positioned<OperationDefinition>,
    ) {
        if self.configuration != Configuration::Valid || self.cost <= self.config.maximum_cost {
            return;
        }

        let error = CostError::CostExceeded {
            maximum: self.config.maximum_cost,
            actual: self.cost,
        };
        ctx.report_error(RuleError::from_cost_error(&error, operation.pos));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{CostMap, CostSpec, COST_DIRECTIVE_SDL};
    use crate::schema::SchemaIndex;
    use crate::validation::validate;

    fn directive_schema() -> SchemaIndex {
        SchemaIndex::parse(&format!(
            r#"
            {COST_DIRECTIVE_SDL}

            type Query {{
                alpha: String! @cost(complexity: 1)
                charlie(first: Int): [Charlie!]! @cost(complexity: 5, multipliers: ["first"])
                plain(first: Int): [Charlie!]! @cost(complexity: 5, multipliers: ["first"], useMultipliers: false)
                search(filter: SearchFilter): [Charlie!]! @cost(complexity: 3, multipliers: ["filter.ids"])
                node: Node
                count: Int
            }}

            type Mutation {{
                update: Charlie @cost(complexity: 10)
            }}

            type Charlie {{
                delta: Delta! @cost(complexity: 2)
                label: String
            }}

            type Delta {{
                echo: String! @cost(complexity: 1)
            }}

            input SearchFilter {{
                ids: [ID!]
            }}

            interface Node {{
                id: ID! @cost(complexity: 2)
            }}
            "#
        ))
        .unwrap()
    }

    fn equivalent_cost_map() -> CostMap {
        serde_json::from_value(serde_json::json!({
            "Query": {
                "alpha": { "complexity": 1 },
                "charlie": { "complexity": 5, "multipliers": ["first"] }
            },
            "Charlie": { "delta": { "complexity": 2 } },
            "Delta": { "echo": { "complexity": 1 } }
        }))
        .unwrap()
    }

    fn run(schema: &SchemaIndex, config: CostValidatorConfig, query: &str) -> (i64, Vec<RuleError>) {
        let document = async_graphql_parser::parse_query(query).unwrap();
        let mut validator = CostValidator::new(config);
        let errors = validate(schema, &document, &mut [&mut validator]);
        (validator.cost(), errors)
    }

    fn cost_of(query: &str) -> i64 {
        let (cost, errors) = run(&directive_schema(), CostValidatorConfig::new(i64::MAX), query);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        cost
    }

    const SCENARIO_QUERY: &str = "{ alpha bravo: alpha charlie(first: 5) { delta { echo } } }";

    #[test]
    fn test_directive_costs_exceed_maximum() {
        let (cost, errors) = run(&directive_schema(), CostValidatorConfig::new(10), SCENARIO_QUERY);

        assert_eq!(cost, 42);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            "The query exceeds the maximum cost of 10. Actual cost is 42"
        );
    }

    #[test]
    fn test_cost_map_matches_directives() {
        let schema = SchemaIndex::parse(
            r#"
            type Query { alpha: String! charlie(first: Int): [Charlie!]! }
            type Charlie { delta: Delta! }
            type Delta { echo: String! }
            "#,
        )
        .unwrap();
        let config = CostValidatorConfig::new(10).cost_map(equivalent_cost_map());

        let (cost, errors) = run(&schema, config, SCENARIO_QUERY);

        assert_eq!(cost, 42);
        assert_eq!(
            errors[0].message,
            "The query exceeds the maximum cost of 10. Actual cost is 42"
        );
    }

    #[test]
    fn test_cost_map_takes_over_from_directives() {
        let mut cost_map = CostMap::new();
        cost_map
            .entry("Query".into())
            .or_default()
            .insert("alpha".into(), CostSpec::new(7));
        let config = CostValidatorConfig::new(i64::MAX).cost_map(cost_map);

        let (cost, errors) = run(&directive_schema(), config, SCENARIO_QUERY);

        // alpha + bravo from the map, every other field falls back to default_cost
        assert_eq!(cost, 14);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_invalid_cost_map_reports_configuration_error_only() {
        let cost_map = serde_json::from_value(serde_json::json!({
            "Query": { "missing": { "complexity": 1 } }
        }))
        .unwrap();
        let config = CostValidatorConfig::new(0).cost_map(cost_map);

        let (cost, errors) = run(&directive_schema(), config, "query A { alpha } query B { count }");

        assert_eq!(cost, 0);
        assert_eq!(errors.len(), 1);
        assert!(errors[0]
            .message
            .contains("cost map contains a field missing not defined in the Query type"));
        assert!(errors[0].extensions.is_none());
    }

    #[test]
    fn test_empty_list_multiplier_falls_back_to_complexity() {
        let (cost, errors) = run(
            &directive_schema(),
            CostValidatorConfig::new(3),
            "{ search(filter: { ids: [] }) { label } }",
        );

        assert_eq!(cost, 3);
        assert!(errors.is_empty());
        assert_eq!(cost_of(r#"{ search(filter: { ids: ["a", "b"] }) { delta { echo } } }"#), 6 + 4 + 2);
    }

    #[test]
    fn test_zero_multiplier_is_omitted() {
        let with_zero = cost_of("{ charlie(first: 0) { delta { echo } } }");
        let without = cost_of("{ charlie { delta { echo } } }");

        assert_eq!(with_zero, 5 + 2 + 1);
        assert_eq!(with_zero, without);
    }

    #[test]
    fn test_under_maximum_reports_nothing() {
        let (cost, errors) = run(&directive_schema(), CostValidatorConfig::new(42), SCENARIO_QUERY);

        assert_eq!(cost, 42);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_fragment_spreads_use_parent_multipliers() {
        let query = r#"
            {
                first: charlie(first: 5) { ...Nested }
                second: charlie(first: 2) { ...Nested }
            }
            fragment Nested on Charlie { delta { echo } }
        "#;

        // (25 + 10 + 5) + (10 + 4 + 2)
        assert_eq!(cost_of(query), 56);
        assert_eq!(
            cost_of("{ ...Top alpha } fragment Top on Query { charlie(first: 3) { delta { echo } } }"),
            15 + 6 + 3 + 1
        );
    }

    #[test]
    fn test_inline_fragments() {
        assert_eq!(
            cost_of("{ ... on Query { charlie(first: 2) { ... { delta { echo } } } } ... { alpha } }"),
            10 + 4 + 2 + 1
        );
    }

    #[test]
    fn test_siblings_do_not_share_multipliers() {
        let alpha_cost = |charlie: &str| {
            cost_of(&format!("{{ {charlie} alpha }}")) - cost_of(&format!("{{ {charlie} }}"))
        };

        assert_eq!(alpha_cost("charlie(first: 5) { delta { echo } }"), 1);
        assert_eq!(alpha_cost("charlie(first: 9) { delta { echo } }"), 1);
        assert_eq!(
            cost_of("{ charlie(first: 3) { delta { echo } label } }"),
            15 + 6 + 3
        );
    }

    #[test]
    fn test_use_multipliers_false_ignores_stack() {
        assert_eq!(cost_of("{ plain(first: 5) { delta { echo } } }"), 5 + 2 + 1);
        assert_eq!(
            cost_of("{ charlie(first: 4) { delta { echo } } plain(first: 10) { delta } }"),
            20 + 8 + 4 + 5 + 2
        );
    }

    #[test]
    fn test_default_cost_without_declarations() {
        let schema = SchemaIndex::parse(
            "type Query { users: [User!]! } type User { name: String friends: [User!]! }",
        )
        .unwrap();
        let config = CostValidatorConfig::new(i64::MAX).default_cost(2);

        let (cost, _) = run(&schema, config, "{ users { name friends { name } } }");

        assert_eq!(cost, 2 * 4);
    }

    #[test]
    fn test_explicit_zero_complexity_is_honored() {
        let schema = SchemaIndex::parse("type Query { a: Int b: Int }").unwrap();
        let cost_map = serde_json::from_value(serde_json::json!({
            "Query": { "a": { "complexity": 0 }, "b": {} }
        }))
        .unwrap();
        let config = CostValidatorConfig::new(i64::MAX)
            .default_complexity(5)
            .cost_map(cost_map);

        assert_eq!(run(&schema, config.clone(), "{ a }").0, 0);
        assert_eq!(run(&schema, config, "{ b }").0, 5);
    }

    #[test]
    fn test_variables_drive_multipliers() {
        let config = CostValidatorConfig::new(i64::MAX)
            .variables(Variables::from_json(serde_json::json!({ "n": 5 })));
        let (cost, _) = run(
            &directive_schema(),
            config,
            "query Q($n: Int) { charlie(first: $n) { delta { echo } } }",
        );
        assert_eq!(cost, 40);

        assert_eq!(
            cost_of("query Q($n: Int = 5) { charlie(first: $n) { delta { echo } } }"),
            40
        );
    }

    #[test]
    fn test_argument_coercion_error_is_not_fatal() {
        let (cost, errors) = run(
            &directive_schema(),
            CostValidatorConfig::new(100),
            r#"{ charlie(first: "five") { delta { echo } } alpha }"#,
        );

        assert_eq!(cost, 5 + 2 + 1 + 1);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Argument \"first\" has invalid value"));
    }

    #[test]
    fn test_unknown_fields_cost_nothing() {
        assert_eq!(cost_of("{ __typename alpha missing { echo } }"), 1);
    }

    #[test]
    fn test_interface_fields() {
        assert_eq!(cost_of("{ node { id } }"), 2);
    }

    // Operation order within a document is unspecified, so only the final
    // total may exceed the maximum here.
    #[test]
    fn test_operations_accumulate() {
        let (cost, errors) = run(
            &directive_schema(),
            CostValidatorConfig::new(13),
            "query A { alpha } mutation B { update { delta { echo } } }",
        );

        assert_eq!(cost, 1 + 10 + 2 + 1);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.ends_with("Actual cost is 14"));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let schema = directive_schema();
        let first = run(&schema, CostValidatorConfig::new(10), SCENARIO_QUERY);
        let second = run(&schema, CostValidatorConfig::new(10), SCENARIO_QUERY);

        assert_eq!(first, second);
    }

    #[test]
    fn test_recursive_fragments_terminate() {
        let schema = SchemaIndex::parse("type Query { a: Int self: Query }").unwrap();
        let config = CostValidatorConfig::new(i64::MAX).default_cost(1);

        let (cost, _) = run(
            &schema,
            config.clone(),
            "{ ...Loop } fragment Loop on Query { a self { ...Loop } }",
        );
        // a + self, the nested spread adds nothing
        assert_eq!(cost, 2);

        let (cost, _) = run(
            &schema,
            config.default_cost(100),
            "{ ...Loop } fragment Loop on Query { self { ...Loop } }",
        );
        assert_eq!(cost, 100);
    }

    #[test]
    fn test_missing_fragment_costs_default() {
        let schema = SchemaIndex::parse("type Query { a: Int }").unwrap();
        let config = CostValidatorConfig::new(i64::MAX).default_cost(4);

        assert_eq!(run(&schema, config, "{ a ...Missing }").0, 8);
    }

    #[test]
    fn test_repeated_fragment_spreads_are_costed_once() {
        let schema = SchemaIndex::parse("type Query { a: Int }").unwrap();
        let mut query = String::from("{ ...F25 } fragment F0 on Query { a }");
        for level in 1..=25 {
            query.push_str(&format!(
                " fragment F{level} on Query {{ ...F{prev} ...F{prev} }}",
                prev = level - 1
            ));
        }

        let (cost, errors) = run(&schema, CostValidatorConfig::new(i64::MAX).default_cost(1), &query);

        assert_eq!(cost, 1 << 25);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_fragments_under_different_multipliers_are_costed_once() {
        let schema = SchemaIndex::parse(&format!(
            r#"
            {COST_DIRECTIVE_SDL}

            type Query {{
                a: Int @cost(complexity: 1)
                nested(n: Int): Query @cost(complexity: 0, multipliers: ["n"])
            }}
            "#
        ))
        .unwrap();
        let mut query = String::from("{ ...F25 } fragment F0 on Query { a }");
        for level in 1..=25 {
            query.push_str(&format!(
                " fragment F{level} on Query {{ x: nested(n: 2) {{ ...F{prev} }} y: nested(n: 3) {{ ...F{prev} }} }}",
                prev = level - 1
            ));
        }

        let (cost, errors) = run(&schema, CostValidatorConfig::new(i64::MAX), &query);

        assert_eq!(cost, 5i64.pow(25));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_fragment_costs_follow_operation_variables() {
        let query = r#"
            query A($n: Int = 2) { ...Page }
            query B($n: Int = 3) { ...Page }
            fragment Page on Query { charlie(first: $n) { delta { echo } } }
        "#;

        // (10 + 4 + 2) + (15 + 6 + 3)
        assert_eq!(cost_of(query), 40);
    }

    #[test]
    fn test_subscription_operations() {
        let schema = SchemaIndex::parse(&format!(
            r#"
            {COST_DIRECTIVE_SDL}

            type Query {{
                ping: Int
            }}

            type Subscription {{
                ticks(n: Int): [Tick!]! @cost(complexity: 3, multipliers: ["n"])
            }}

            type Tick {{
                x: Int @cost(complexity: 1)
                reading: Reading
                pinned: Reading @cost(complexity: 7)
            }}

            type Reading @cost(complexity: 2) {{
                value: Int
            }}
            "#
        ))
        .unwrap();

        let (cost, errors) = run(&schema, CostValidatorConfig::new(20), "subscription { ticks(n: 4) { x } }");
        assert_eq!(cost, 3 * 4 + 4);
        assert!(errors.is_empty());

        // Reading carries a type-level cost
        let (cost, errors) = run(
            &schema,
            CostValidatorConfig::new(20),
            "subscription { ticks(n: 4) { x reading { value } } }",
        );
        assert_eq!(cost, 24);
        assert_eq!(
            errors[0].message,
            "The query exceeds the maximum cost of 20. Actual cost is 24"
        );

        // the field-level cost wins over the type-level one
        let (cost, _) = run(
            &schema,
            CostValidatorConfig::new(20),
            "subscription { ticks(n: 1) { pinned { value } } }",
        );
        assert_eq!(cost, 3 + 7);
    }
}
