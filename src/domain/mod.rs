// Domain layer: layer model and ports. Geometry comes from `geo`, attributes from serde_json.

pub mod model;
pub mod ports;
