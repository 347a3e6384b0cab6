// src/core/worker/template.rs

//! Renders a launch config and desired capacity into a stack template with
//! one server resource per slot.

use serde_json::{Map, Value, json};

/// Launch-config property names that differ from their template equivalents.
const PROPERTY_RENAMES: &[(&str, &str)] = &[
    ("imageRef", "image"),
    ("flavorRef", "flavor"),
    ("OS-DCF:diskConfig", "diskConfig"),
];

fn rename_keys(server_args: &Value) -> Value {
    let Some(object) = server_args.as_object() else {
        return server_args.clone();
    };
    let mut renamed = Map::new();
    for (key, value) in object {
        let new_key = PROPERTY_RENAMES
            .iter()
            .find(|(from, _)| from == key)
            .map(|(_, to)| to.to_string())
            .unwrap_or_else(|| key.clone());
        renamed.insert(new_key, value.clone());
    }
    Value::Object(renamed)
}

/// A stack template with `desired` identical `OS::Nova::Server` resources,
/// one per capacity slot.
pub fn generate_template(server_args: &Value, desired: u32) -> Value {
    let resource = json!({
        "type": "OS::Nova::Server",
        "properties": rename_keys(server_args),
    });
    let mut resources = Map::new();
    for i in 0..desired {
        resources.insert(format!("server_{i}"), resource.clone());
    }
    json!({
        "heat_template_version": "2013-05-23",
        "resources": resources,
    })
}
