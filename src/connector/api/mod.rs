pub mod container;
pub mod controller;

pub use container::{Container, ContainerConfig, VIDEO_OUTPUT_URI_ENV};
pub use controller::{CatalogController, ChatController};
