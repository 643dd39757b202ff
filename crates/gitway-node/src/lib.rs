//! # Gitway Node
//!
//! Git smart HTTP server for a directory of bare repositories.
//!
//! Standard git clients clone, fetch and push against it; the git work
//! itself is done by an external engine (the `git` executable) started once
//! per request in stateless-RPC mode.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Gitway Node                         │
//! ├──────────────────────────────────────────────────────────┤
//! │  server      TCP listener, graceful shutdown             │
//! │     │                                                    │
//! │  router      /<repo>/{info/refs, git-upload-pack,        │
//! │     │         git-receive-pack}, repository resolution   │
//! │     ├──────────────────────┐                             │
//! │  advertise              bridge                           │
//! │  preamble + refs        request body → stdin,            │
//! │     │                   stdout → response                │
//! │     └──────────┬───────────┘                             │
//! │          GitEngine (gitway-git)                          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! REPO_DIR=/srv/git PORT=6969 cargo run --bin gitway-node
//! git clone http://localhost:6969/project.git
//! ```
//!
//! ## Modules
//!
//! - [`router`] - Request routing and shared state
//! - [`advertise`] - `info/refs` reference advertisement
//! - [`bridge`] - Stateless-RPC bridging for upload-pack and receive-pack
//! - [`repository`] - Repository identifier resolution
//! - [`server`] - Listener and shutdown handling
//! - [`config`] - Server configuration
//! - [`observability`] - Structured logging, metrics, and request tracing
//!
//! ## Example: Serving with a custom engine
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gitway_git::GitCli;
//! use gitway_node::config::ServerConfig;
//! use gitway_node::router::{create_router, AppState};
//!
//! let config = ServerConfig::new("/srv/git");
//! let state = AppState::new(config, Arc::new(GitCli::new("/usr/bin/git")));
//! let app = create_router(state);
//! ```

pub mod advertise;
pub mod bridge;
pub mod config;
pub mod error;
pub mod observability;
pub mod repository;
pub mod router;
pub mod server;

pub use error::ApiError;
