// Domain layer - query model and transformation catalog
pub mod functions;
pub mod registry;
pub mod series;
pub mod target;
