//! Signed calls to the open platform.

pub mod client;
pub mod proxy_env;
pub mod transport;
pub mod types;

pub use client::{OpenApiClient, LIST_PATH, SET_PATH, SYNC_PATH};
pub use proxy_env::{forward_proxy_for, forward_proxy_from_env, LOCAL_CAPTURE_PROXIES};
pub use transport::{HttpTransport, ReqwestTransport};
pub use types::{AllowAction, ApiResponse, RequestLog};
