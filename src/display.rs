use crate::schema::FieldKind;
use crate::{RowValue, statics};
use std::borrow::Cow;

/// Cell text for an effective value. Missing values fall back per column kind:
/// free text shows nothing, labels show a placeholder, flags read as false.
pub fn display_value(value: &RowValue, kind: FieldKind) -> Cow<'_, str> {
    if kind == FieldKind::Flag {
        return Cow::Borrowed(if flag_value(value) { "true" } else { "false" });
    }
    match value {
        RowValue::Null => Cow::Borrowed(match kind {
            FieldKind::Label => statics::EN_PLACEHOLDER_NA,
            _ => statics::EN_EMPTY,
        }),
        RowValue::String(s) => Cow::Borrowed(s.as_str()),
        RowValue::Array(items) if items.iter().all(is_scalar) => Cow::Owned(
            items
                .iter()
                .map(|v| match v {
                    RowValue::String(s) => s.clone(),
                    other => other.to_json_compact(),
                })
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Cow::Owned(other.to_json_compact()),
    }
}

pub fn flag_value(value: &RowValue) -> bool {
    value.as_bool().unwrap_or(false)
}

fn is_scalar(value: &RowValue) -> bool {
    matches!(
        value,
        RowValue::Null | RowValue::Bool(_) | RowValue::Number(_) | RowValue::String(_)
    )
}
