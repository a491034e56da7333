use serde_json::Value;

use super::{Layout, VariableSet};

/// Fills `layout` in place with `vars`.
///
/// Every slot whose name is a key of `vars` is overwritten by that value, nested
/// structures included. Unmatched nested slots are searched recursively, so a
/// variable reaches a slot at any depth. A replaced slot is not descended into:
/// an outer slot shadows inner slots of the same name below it, while
/// same-named slots in unrelated branches are all filled.
pub fn bind(layout: &mut Layout, vars: &VariableSet) {
    match layout {
        Value::Object(slots) => {
            for (name, slot) in slots.iter_mut() {
                match vars.get(name) {
                    Some(value) => *slot = value.clone(),
                    None => bind(slot, vars),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                bind(item, vars);
            }
        }
        _ => {}
    }
}

/// Value-returning form of [`bind`].
pub fn bound(layout: &Layout, vars: &VariableSet) -> Layout {
    let mut filled = layout.clone();
    bind(&mut filled, vars);
    filled
}
