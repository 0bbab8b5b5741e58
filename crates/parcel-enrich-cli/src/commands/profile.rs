//! `parcel-enrich profile`: dump the built-in site profile.

use anyhow::Result;

use parcel_enrich::SiteProfile;

/// Print the default profile as JSON, ready to be edited and passed back
/// with `--profile`.
pub fn run() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&SiteProfile::default())?);
    Ok(())
}
