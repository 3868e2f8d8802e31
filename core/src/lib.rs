pub mod ancestry;
pub mod consumed;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod recipes;
pub mod service;
pub mod steps;
pub mod validator;

pub use db::{Database, StoreOptions};
pub use error::{Result, StoreError};
pub use service::LadleService;
