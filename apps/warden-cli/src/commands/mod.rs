pub mod agent;
pub mod approvals;
pub mod audit;
pub mod rule;
pub mod submit;
pub mod token;
