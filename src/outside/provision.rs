use std::{fs, io::Read, path::Path};

use miette::miette;
use tracing::{info, warn};

use crate::{result::Result, settings::ToolSettings};

/// Hard ceiling on the fetched artifact size
const MAX_BINARY_SIZE: u64 = 100 * 1024 * 1024;

/// Fetch the extraction binary if it is not present yet.
///
/// Never fails the caller: a provisioning problem is logged and will
/// resurface on the first actual tool invocation instead.
pub fn ensure_binary(settings: &ToolSettings) {
    if settings.binary_path.exists() {
        return;
    }

    info!(
        "Extraction binary '{}' is absent, fetching '{}' from the release feed",
        settings.binary_path.display(),
        settings.platform_asset
    );

    let fetched = fetch_release(&settings.release_feed_url, &settings.platform_asset)
        .and_then(|bytes| persist(&settings.binary_path, &bytes));

    match fetched {
        Ok(()) => info!(
            "Provisioned extraction binary at '{}'",
            settings.binary_path.display()
        ),
        Err(err) => warn!(
            "Could not provision the extraction binary: {}",
            miette::Report::from(err)
        ),
    }
}

/// Fetch the latest stable release artifact for the configured platform.
///
/// A response that is not itself a binary payload is read as text and
/// treated as the redirect target to fetch in turn.
fn fetch_release(feed_url: &str, asset: &str) -> Result<Vec<u8>> {
    let url = format!("{}/{asset}", feed_url.trim_end_matches('/'));

    let response = ureq::get(&url)
        .call()
        .map_err(|err| miette!("Release feed request failed: {err}"))?;

    if is_binary_payload(response.content_type()) {
        return read_body(response);
    }

    let redirect = response
        .into_string()
        .map_err(|err| miette!("Could not read release feed response: {err}"))?
        .trim()
        .to_string();

    let response = ureq::get(&redirect)
        .call()
        .map_err(|err| miette!("Release artifact request failed: {err}"))?;

    if !is_binary_payload(response.content_type()) {
        return Err(miette!("Release feed did not resolve to a binary artifact").into());
    }

    read_body(response)
}

fn is_binary_payload(content_type: &str) -> bool {
    content_type == "application/octet-stream" || content_type == "application/zip"
}

fn read_body(response: ureq::Response) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_BINARY_SIZE)
        .read_to_end(&mut bytes)
        .map_err(|err| miette!("Could not read release artifact body: {err}"))?;
    Ok(bytes)
}

fn persist(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, bytes)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(())
}
