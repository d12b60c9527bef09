use super::{json_pretty, EXIT_SUCCESS};
use vessel_builtin::Environment;
use vessel_schema::{CapabilityName, Category, ComponentName};

pub fn run(env: &Environment, json: bool) -> Result<u8, String> {
    let registry = env.registry();
    if json {
        println!("{}", json_pretty(&registry.snapshot())?);
        return Ok(EXIT_SUCCESS);
    }

    println!(
        "{:<14} {:<12} {:>4}  {:<16} CAPABILITIES",
        "CATEGORY", "NAME", "PRIO", "PARENTS"
    );
    for category in Category::ALL {
        for entry in registry.components(category) {
            let parents: Vec<&str> = entry.parents().iter().map(ComponentName::as_str).collect();
            let caps: Vec<String> = registry
                .capabilities_of(category, entry.name())
                .into_iter()
                .map(CapabilityName::into_inner)
                .collect();
            println!(
                "{:<14} {:<12} {:>4}  {:<16} {}",
                category.as_str(),
                entry.name(),
                entry.priority(),
                parents.join(","),
                caps.join(",")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
