// Adapters layer: file formats and storage backends behind the domain ports.

pub mod geojson;
