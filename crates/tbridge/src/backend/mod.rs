pub mod registry;
pub mod spec;
