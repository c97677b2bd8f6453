#![doc = include_str!("../README.md")]

pub mod api;
pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod guard;
#[cfg(feature = "http")]
pub mod http;
pub mod pipeline;
pub mod report;
pub mod services;
pub mod session;
pub mod storage;
pub mod types;
pub mod user;

// Re-exports for convenient access
pub use api::{ApiRequest, ApiResponse, Form, Method, Query, Transport};
pub use client::NewsClient;
pub use config::{ClientConfig, ExecutionContext};
pub use error::{AuthError, Error, ErrorPayload};
pub use guard::{Guard, NavigationAttempt, NavigationState, Redirect};
#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use pipeline::AuthPipeline;
pub use report::ErrorReport;
pub use session::{Session, SessionManager};
pub use storage::{CredentialStore, FileStore, MemoryStore, NullStore, Storage};
pub use types::{AccessToken, CredentialPair, Page, RefreshToken, Role, UserId};
pub use user::{LoginRequest, RegisterRequest, User};
