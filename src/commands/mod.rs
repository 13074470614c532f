pub mod diff;
pub mod filters;
pub mod validate;
