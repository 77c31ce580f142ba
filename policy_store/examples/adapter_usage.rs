// examples/adapter_usage.rs
//
// Walks through the policy adapter: bootstrap rules, auto-save style writes,
// prefix-filtered removal and a full save into a fresh collection.

use policy_model::{Adapter, Model, Section};
use policy_store::{AdapterConfig, AdapterError, KeyStrategy, PolicyAdapter, SqliteStore};
use std::sync::Arc;

const BUILTIN_POLICY: &str = "\
# built-in roles
p, role-admin, data1, write
g, alice, role-admin
";

fn rule(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|s| s.to_string()).collect()
}

fn main() -> Result<(), AdapterError> {
    println!("=== Policy Adapter Usage ===\n");

    let store = Arc::new(SqliteStore::open_in_memory()?);

    // Example 1: Bootstrap and auto-save writes
    let config = AdapterConfig::new("casbin").with_bootstrap_policy(BUILTIN_POLICY);
    let adapter = PolicyAdapter::new(Arc::clone(&store), config)?;

    adapter.add_policies(
        Section::Policy,
        "p",
        &[
            rule(&["subject-a", "action-a", "get"]),
            rule(&["subject-a", "action-a", "write"]),
            rule(&["subject-b", "action-a", "get"]),
        ],
    )?;
    adapter.add_policy(Section::Grouping, "g", &rule(&["bob", "subject-b"]))?;
    print_model("After writes", &adapter)?;

    // Example 2: Filtered removal by leading fields
    adapter.remove_filtered_policy(Section::Policy, "p", 0, &rule(&["subject-a"]))?;
    print_model("After removing subject-a", &adapter)?;

    match adapter.remove_filtered_policy(Section::Policy, "p", 1, &rule(&["action-a"])) {
        Err(e) if e.is_unsupported() => println!("Rejected: {}\n", e),
        other => println!("Unexpected: {:?}\n", other),
    }

    // Example 3: Filtered replace, mirrored into a loaded model
    let mut model = Model::rbac();
    adapter.load_policy(&mut model)?;

    let new_rules = vec![rule(&["subject-b", "action-b", "get"])];
    let filter = rule(&["subject-b"]);
    let replaced =
        adapter.update_filtered_policies(Section::Policy, "p", &new_rules, 0, &filter)?;
    let dropped = model.remove_filtered_policy(Section::Policy, "p", 0, &filter)?;
    for new_rule in &new_rules {
        model.add_policy(Section::Policy, "p", new_rule.clone())?;
    }
    println!("Replaced in store: {:?}", replaced);
    println!("Replaced in model: {:?}", dropped);
    println!(
        "Model holds new rule: {}",
        model.has_policy(Section::Policy, "p", &new_rules[0])
    );
    print_model("After replace", &adapter)?;

    // Example 4: Reload, then save the whole model into a digest-keyed collection
    model.clear_policy();
    adapter.load_policy(&mut model)?;

    let archive = PolicyAdapter::new(
        Arc::clone(&store),
        AdapterConfig::new("casbin_archive").with_key_strategy(KeyStrategy::Digest),
    )?;
    archive.save_policy(&model)?;
    for record in archive.records()? {
        let stored = record.to_rule()?;
        println!(
            "{} [{}] -> {}",
            record.key,
            stored.section()?,
            record.policy_line()
        );
    }

    println!("\n=== All Examples Completed Successfully ===");
    Ok(())
}

fn print_model<A: Adapter>(title: &str, adapter: &A) -> Result<(), A::Error> {
    let mut model = Model::rbac();
    adapter.load_policy(&mut model)?;

    println!("--- {} ---", title);
    for sec in Section::all() {
        for (ptype, assertion) in model.policy_types(sec) {
            for fields in &assertion.policy {
                println!("{}, {}", ptype, fields.join(", "));
            }
        }
    }
    println!();
    Ok(())
}
