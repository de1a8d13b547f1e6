pub mod crawler;
pub mod sentiment;
