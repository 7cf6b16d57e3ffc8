//! Resource location: which Parquet resource of a package serves a given year.

use crate::portal::{PackageMetadata, ResourceDescriptor};

/// Declared format of Parquet resources, compared ignoring ASCII case.
const PARQUET_FORMAT: &str = "PARQUET";

/// File extension of Parquet resources, compared case-sensitively.
const PARQUET_EXTENSION: &str = ".parquet";

/// Whether a resource is a Parquet file, by declared format or by URL extension.
pub fn is_parquet(resource: &ResourceDescriptor) -> bool {
    resource.format.eq_ignore_ascii_case(PARQUET_FORMAT) || resource.url.ends_with(PARQUET_EXTENSION)
}

/// Locate the URL of the Parquet resource for `year`.
///
/// Resources are scanned in portal order and the first one satisfying a rule wins:
///
/// * Without a year, the first Parquet resource.
/// * With a year, the first Parquet resource whose name or URL contains the year's decimal
///   representation, falling back to the first Parquet resource when none does. This is a plain
///   substring match, so `2020` also matches `12020` or `2020_v2021`.
///
/// Returns `None` when the package has no Parquet resource.
pub fn locate(metadata: &PackageMetadata, year: Option<i32>) -> Option<&str> {
    let mut candidates = metadata.resources.iter().filter(|r| is_parquet(r));
    let first = candidates.clone().next()?;
    let Some(year) = year else {
        return Some(first.url.as_str());
    };
    let year = year.to_string();
    let located = candidates
        .find(|r| r.name.contains(&year) || r.url.contains(&year))
        .unwrap_or(first);
    Some(located.url.as_str())
}
