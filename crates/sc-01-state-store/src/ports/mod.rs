pub mod api;

pub use api::StateStoreApi;
