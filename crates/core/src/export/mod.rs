//! Output writers

pub mod geojson;

pub use geojson::{
    cell_features, ellipse_features, feature_collection, impact_features, write_feature_collection,
    write_json,
};
