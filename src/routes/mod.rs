pub mod application;
pub mod auth;
pub mod history;
pub mod rating;
pub mod request;
pub mod user;
