pub mod dao;
pub mod models;
