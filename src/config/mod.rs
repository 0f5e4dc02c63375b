// Configuration module
// Public interface for configuration loading

mod backend;
mod loader;
mod settings;

pub use backend::BackendDevice;
pub use loader::{apply_device_override, load_config, parse_config, DEFAULT_CONFIG_FILE, DEVICE_ENV_VAR};
pub use settings::{CyclicMode, ModelConfig, SchedulerConfig, TrainConfig};
