pub mod handlers;
pub mod iterate;
pub mod models;
pub mod store;

pub use store::SessionStore;
