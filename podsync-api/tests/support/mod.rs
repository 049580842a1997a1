pub mod database;
pub mod k8s_client;
pub mod mocks;
pub mod store;
pub mod test_app;
