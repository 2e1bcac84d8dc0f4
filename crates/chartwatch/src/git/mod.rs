//! Working copy management for remote chart repositories.

pub mod auth;
pub mod locks;
pub mod repository;

pub use auth::{authenticated_url, working_copy_dir};
pub use locks::RepoLocks;
pub use repository::{validate_branch, RepositorySync};
