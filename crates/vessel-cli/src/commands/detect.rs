use super::{describe, json_pretty, EXIT_SUCCESS};
use vessel_builtin::hosts;
use vessel_builtin::Environment;
use vessel_plugin::FactProbe;
use vessel_schema::{Category, ComponentName};

/// Parse `key=value` facts.
pub fn parse_facts(facts: &[String]) -> Result<FactProbe, String> {
    let mut probe = FactProbe::new();
    for fact in facts {
        let (key, value) = fact
            .split_once('=')
            .ok_or_else(|| format!("invalid fact '{fact}', expected key=value"))?;
        probe.set_fact(key.trim(), value.trim());
    }
    Ok(probe)
}

pub fn run(
    env: &Environment,
    category: Category,
    machine: Option<&str>,
    facts: &[String],
    json: bool,
) -> Result<u8, String> {
    let mut probe = match machine {
        Some(m) => env.probe_for(m).map_err(|e| describe(&e))?,
        None if category == Category::Host => hosts::local_probe(),
        None => FactProbe::new(),
    };
    for (key, value) in parse_facts(facts)?.facts() {
        probe.set_fact(key.as_str(), value.as_str());
    }

    let registry = env.registry();
    let detected = registry
        .detect(category, &probe)
        .map_err(|e| describe(&e))?;
    let host = registry
        .capability_host(category, Some(detected.as_str()), &probe)
        .map_err(|e| describe(&e))?;

    if json {
        let payload = serde_json::json!({
            "category": category,
            "detected": detected,
            "chain": host.chain(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        let chain: Vec<&str> = host.chain().iter().map(ComponentName::as_str).collect();
        println!("{category}: {detected}");
        println!("chain: {}", chain.join(" -> "));
    }
    Ok(EXIT_SUCCESS)
}
