mod parsing;
mod settings;
mod types;

pub(crate) use types::{CorsSettings, Settings, StoreBackend};
