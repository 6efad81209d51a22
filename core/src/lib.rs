//! `garage-core`: motorcycle maintenance tracker core.
//!
//! Owns the in-memory view of one owner's garage (motorcycles plus the
//! service logs, reminders and tech data of the selected motorcycle) and
//! keeps it consistent with a remote record store.
//!
//! ## Layout
//! - [`model`]: record types and their document encoding
//! - [`store`]: record/blob store contracts plus memory and file adapters
//! - [`image`]: photo downscaling before upload
//! - [`session`]: owner sign-in/sign-out transitions
//! - [`state`]: the published controller state
//! - [`controller`]: selection and sync controller
//! - [`config`]: layered configuration

pub mod config;
pub mod controller;
pub mod error;
pub mod image;
pub mod model;
pub mod session;
pub mod state;
pub mod store;

pub use config::{ConfigLoader, GarageConfig};
pub use controller::GarageController;
pub use error::{GarageError, ImageError, StoreError};
pub use session::Session;
pub use state::GarageState;

/// Directory name used under the platform data/config directories.
pub const APP_DIRNAME: &str = "motogarage";

/// Default data directory (`$XDG_DATA_HOME/motogarage`).
///
/// Falls back to `./.motogarage` when no platform data directory exists.
pub fn default_data_dir() -> std::path::PathBuf {
    match dirs::data_dir() {
        Some(dir) => dir.join(APP_DIRNAME),
        None => std::path::PathBuf::from(format!(".{APP_DIRNAME}")),
    }
}
