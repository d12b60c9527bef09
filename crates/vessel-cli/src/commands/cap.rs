use super::{describe, json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use vessel_builtin::Environment;
use vessel_schema::Category;

/// Report which component in `name`'s ancestry serves `capability`.
pub fn run(
    env: &Environment,
    category: Category,
    name: &str,
    capability: &str,
    json: bool,
) -> Result<u8, String> {
    let registry = env.registry();
    let supported = registry
        .supports_capability(category, name, capability)
        .map_err(|e| describe(&e))?;
    let owner = if supported {
        Some(
            registry
                .resolve_capability(category, name, capability)
                .map_err(|e| describe(&e))?
                .owner,
        )
    } else {
        None
    };

    if json {
        let payload = serde_json::json!({
            "category": category,
            "component": name,
            "capability": capability,
            "supported": supported,
            "owner": owner,
        });
        println!("{}", json_pretty(&payload)?);
    } else if let Some(owner) = &owner {
        println!("{category} '{name}' supports '{capability}' via '{owner}'");
    } else {
        println!("{category} '{name}' does not support '{capability}'");
    }
    Ok(if supported { EXIT_SUCCESS } else { EXIT_FAILURE })
}
