//! Throttling logic applied to session records.

mod evaluator;
mod policy;

pub use evaluator::{CallRequest, Evaluator, Rejection};
pub use policy::ThrottlePolicy;
