use std::collections::HashSet;

use super::extract::SitemapExtractor;

/// Locations present in `new_content` but absent from `old_content`.
///
/// Order follows `new_content`; membership is exact string equality. A URL
/// repeated in `new_content` is reported once per occurrence.
pub fn diff_locations(
    extractor: &dyn SitemapExtractor,
    new_content: &str,
    old_content: &str,
) -> Vec<String> {
    let old: HashSet<String> = extractor.locations(old_content).into_iter().collect();
    extractor
        .locations(new_content)
        .into_iter()
        .filter(|loc| !old.contains(loc))
        .collect()
}
