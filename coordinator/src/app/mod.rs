mod runtime;
mod startup;
mod state;

// Re-export a curated crate-visible surface for consumers of `crate::app`
pub(crate) use startup::start;
pub(crate) use state::AppState;
