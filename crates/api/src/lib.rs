#![forbid(unsafe_code)]

pub mod client;
pub mod http;
pub mod memory;

pub use client::{Api, ApiError, CompletionAck, CourseApi, QuizApi};
pub use http::{ApiConfig, HttpApi};
pub use memory::{Endpoint, InMemoryApi};
