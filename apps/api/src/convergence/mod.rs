// Convergence Controller
// Drives the rewrite oracle toward a target length, then applies the hard cap.
// All oracle calls go through `dyn RewriteOracle`; nothing here talks HTTP directly.

pub mod controller;
pub mod handlers;
pub mod prompts;
pub mod report;
pub mod request;

// Re-export the public API consumed by the session layer and handlers.
pub use controller::run_convergence_loop;
pub use report::OutcomeKind;
pub use request::AdjustmentRequest;
