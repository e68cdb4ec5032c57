//! Optional user-defined post-filter hook applied to search results.
//!
//! The actual sandbox that runs UDF bodies is an external collaborator
//! (§1 Out of scope); all the shard core owns is the marker-detection and
//! best-effort application contract described in §4.8: a UDF filter failure
//! logs and falls back to the unfiltered result rather than failing the
//! request.

use shardql_core::value::Row;

use crate::engine::SearchHit;

pub const UDF_MARKER: &[u8] = b"\"$udf\"";

/// A pluggable post-filter evaluated against each hit after a search.
pub trait UdfFilter: Send + Sync {
    /// Whether `query` carries this filter's marker and should be applied.
    fn detect(&self, query: &[u8]) -> bool;
    /// Evaluate the filter against one row. `Err` triggers the best-effort
    /// fallback described above.
    fn matches(&self, query: &[u8], row: &Row) -> Result<bool, String>;
}

/// Applies `udf` to `hits` if it detects its marker in `query`; on any
/// evaluation failure, logs and returns `hits` unfiltered.
pub fn apply_udf_filter(
    udf: Option<&dyn UdfFilter>,
    query: &[u8],
    hits: Vec<SearchHit>,
) -> Vec<SearchHit> {
    let Some(udf) = udf else { return hits };
    if !udf.detect(query) {
        return hits;
    }
    let mut kept = Vec::with_capacity(hits.len());
    for hit in &hits {
        match udf.matches(query, &hit.source) {
            Ok(true) => kept.push(hit.clone()),
            Ok(false) => {}
            Err(e) => {
                log::warn!("UDF post-filter failed, returning unfiltered results: {e}");
                return hits;
            }
        }
    }
    kept
}
