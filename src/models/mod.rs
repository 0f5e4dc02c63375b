// Machine learning models
// The expert classifier plus checkpoint persistence

pub mod expert;
pub mod persistence;

pub use expert::ExpertModel;
pub use persistence::{
    load_model_metadata, metadata_path, model_exists, save_model_with_metadata, ModelMetadata,
    Saveable,
};
