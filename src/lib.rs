// src/lib.rs

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod routes;
pub mod state;

// Re-export specific items for convenience if needed
pub use engine::QuizService;
pub use routes::create_router;
