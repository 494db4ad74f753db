pub mod liveness_signals;
pub mod liveness_verdict;
pub mod liveness_verifier;
