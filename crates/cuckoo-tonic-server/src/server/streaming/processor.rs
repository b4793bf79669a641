use crate::server::registry::Registry;
use cuckoo_tonic_core::proto::{LookupElementsStreamRequest, LookupElementsStreamResponse};

/// Evaluates a single streamed lookup.
///
/// Returns a response only when the named filter exists and reports the
/// element as present. Unknown filters and non-matches yield `None` and are
/// dropped by the caller; the streaming path never reports them.
///
/// The filter's read lock is released before this function returns, so the
/// caller may `.await` on the result freely.
pub fn match_request(
    registry: &Registry,
    req: LookupElementsStreamRequest,
) -> Option<LookupElementsStreamResponse> {
    let entry = registry.get(&req.filter_name)?;
    let found = entry.read().lookup(req.element.as_bytes());

    found.then(|| LookupElementsStreamResponse {
        element: req.element,
    })
}
