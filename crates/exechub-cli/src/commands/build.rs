use super::{
    colorize_outcome, exit_code, json_pretty, maybe_spinner, spin_fail, spin_ok, CliError,
    EXIT_FAILURE, EXIT_SUCCESS,
};
use exechub_core::{BuildOptions, BuildSummary, HubIO};
use std::path::Path;

pub fn run(hub: &HubIO, path: &Path, options: &BuildOptions, json: bool) -> Result<u8, CliError> {
    let pb = maybe_spinner(json, &format!("building {}...", path.display()));
    let summary = match hub.build(path, options) {
        Ok(s) => s,
        Err(e) => {
            spin_fail(pb.as_ref(), "build failed");
            return Err(e.into());
        }
    };

    let image = summary.image.as_deref().unwrap_or(&summary.name);
    if summary.is_build_success {
        spin_ok(
            pb.as_ref(),
            &format!("{image} ready in {:.1}s", summary.build_duration_secs),
        );
    } else {
        spin_fail(pb.as_ref(), &format!("{image} failed"));
    }

    if json {
        println!("{}", json_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if summary.is_build_success {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(summary.failure_reason.map_or(EXIT_FAILURE, exit_code))
    }
}

fn print_summary(summary: &BuildSummary) {
    if let Some(ref image) = summary.image {
        println!("image:      {image}");
    }
    println!("usage test: {}", colorize_outcome(summary.is_test_success));
    println!("push:       {}", colorize_outcome(summary.is_push_success));
    if let Some(reason) = summary.failure_reason {
        println!("reason:     {reason}");
    }
    if let Some(ref details) = summary.details {
        println!("details:    {details}");
    }
    if let Some(ref host) = summary.host_info {
        println!(
            "host:       {} ({}/{}, {} as {})",
            host.hostname, host.os, host.arch, host.engine, host.user
        );
    }
}
