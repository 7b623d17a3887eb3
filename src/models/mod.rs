pub mod account;
pub mod audit;
pub mod env_var;
pub mod oauth;
pub mod package;
pub mod project;
pub mod service;
pub mod team;
pub mod user;
