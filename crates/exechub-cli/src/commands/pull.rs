use super::{json_pretty, maybe_spinner, spin_fail, spin_ok, CliError, EXIT_SUCCESS};
use exechub_core::HubIO;

pub fn run(hub: &HubIO, reference: &str, json: bool) -> Result<u8, CliError> {
    let pb = maybe_spinner(json, &format!("pulling {reference}..."));
    let outcome = hub.pull(reference).map_err(|e| {
        spin_fail(pb.as_ref(), "pull failed");
        CliError::from(e)
    })?;
    spin_ok(pb.as_ref(), &format!("pulled {}", outcome.tag));

    if json {
        let payload = serde_json::json!({
            "image": outcome.tag,
            "digest": outcome.entry.digest,
            "size": outcome.entry.size,
            "published_at": outcome.entry.published_at,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "{} ({} bytes, digest {})",
            outcome.tag,
            outcome.entry.size,
            &outcome.entry.digest[..12.min(outcome.entry.digest.len())]
        );
    }
    Ok(EXIT_SUCCESS)
}
