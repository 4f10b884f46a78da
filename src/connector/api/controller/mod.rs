pub mod catalog_controller;
pub mod chat_controller;

pub use catalog_controller::CatalogController;
pub use chat_controller::ChatController;
