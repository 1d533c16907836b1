use flate2::read::GzDecoder;
use std::io::Read;

use super::fetcher::FetchError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// True when the URL path ends in `.gz` (query and fragment ignored).
pub fn is_gzip_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".gz")
}

/// Turn a fetched body into sitemap text.
///
/// Bodies behind a `.gz` URL, or starting with the gzip magic bytes, are
/// stream-decompressed; decompressed output larger than `max_bytes` is
/// rejected. Invalid UTF-8 is replaced rather than refused.
pub fn decode_body(url: &str, body: &[u8], max_bytes: usize) -> Result<String, FetchError> {
    if !is_gzip_url(url) && !body.starts_with(&GZIP_MAGIC) {
        return Ok(String::from_utf8_lossy(body).into_owned());
    }

    let mut out = Vec::new();
    // One extra byte tells "exactly at the limit" from "over the limit"
    let limit = (max_bytes as u64).saturating_add(1);
    GzDecoder::new(body)
        .take(limit)
        .read_to_end(&mut out)
        .map_err(FetchError::Decompress)?;

    if out.len() > max_bytes {
        return Err(FetchError::ResponseTooLarge);
    }

    tracing::debug!(
        url = %url,
        compressed = body.len(),
        decompressed = out.len(),
        "Decompressed gzip sitemap"
    );
    Ok(String::from_utf8_lossy(&out).into_owned())
}
