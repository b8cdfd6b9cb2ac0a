// ============================================================================
// HTTP Surfaces
// ============================================================================
//
// One `configure` per service, mounted by its binary next to
// `metrics::configure`. Handlers log the failure kind and cause, then answer
// with a generic message; callers never see internal error text.
//
// ============================================================================

pub mod genid;
pub mod intake;
pub mod processor;
