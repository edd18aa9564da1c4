use super::{json_pretty, CliError, EXIT_SUCCESS};
use exechub_core::HubIO;
use exechub_remote::CatalogQuery;

pub fn run(hub: &HubIO, query: &CatalogQuery, json: bool) -> Result<u8, CliError> {
    let entries = hub.list(query)?;
    if json {
        println!("{}", json_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("no executors found");
    } else {
        println!(
            "{:<28} {:<10} {:<12} {:<20} KEYWORDS",
            "IMAGE", "TYPE", "KIND", "PUBLISHED"
        );
        for entry in &entries {
            println!(
                "{:<28} {:<10} {:<12} {:<20} {}",
                entry.identity.to_string(),
                entry.manifest.executor_type,
                entry.manifest.kind,
                entry.published_at.format("%Y-%m-%d %H:%M:%S"),
                entry.manifest.keywords.join(",")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
