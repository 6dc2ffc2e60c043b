pub mod auth;
pub mod db;
pub mod mealdb;
pub mod models;
pub mod resolver;
pub mod service;
