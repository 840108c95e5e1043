// Domain layer: data model and ports. Adapters live under `adapters`.

pub mod model;
pub mod ports;
