pub mod decode;
pub mod extsolvers;
pub mod milp;
pub mod plan;
pub mod reconcile;
pub mod sweep;
pub mod validate;

#[cfg(test)]
mod test_instances;


pub use plan::{solve, PlanError, PlannerParams};
