use async_graphql_value::ConstValue;

use crate::arguments::ArgumentValues;

/// Resolve multiplier argument paths to positive numbers
///
/// Each name is a dotted path into the field's coerced arguments
/// (`"filter.ids"`). Lists count as their length, numbers and numeric
/// strings as their integer value. Anything else, and any value that is not
/// strictly positive, is left out of the result.
pub fn resolve_multipliers<S: AsRef<str>>(names: &[S], arguments: &ArgumentValues) -> Vec<i64> {
    names
        .iter()
        .filter_map(|name| lookup(arguments, name.as_ref()))
        .filter_map(multiplier_value)
        .filter(|multiplier| *multiplier > 0)
        .collect()
}

fn lookup<'a>(arguments: &'a ArgumentValues, path: &str) -> Option<&'a ConstValue> {
    let mut segments = path.split('.');
    let mut value = arguments.get(segments.next()?)?;
    for segment in segments {
        match value {
            ConstValue::Object(fields) => value = fields.get(segment)?,
            _ => return None,
        }
    }
    Some(value)
}

fn multiplier_value(value: &ConstValue) -> Option<i64> {
    match value {
        ConstValue::List(items) => i64::try_from(items.len()).ok(),
        ConstValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        ConstValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
