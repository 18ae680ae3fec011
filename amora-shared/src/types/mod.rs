pub mod api;
pub mod auth;
pub mod event;
pub mod feed;
pub mod pagination;

pub use api::*;
pub use auth::*;
pub use event::*;
pub use feed::*;
pub use pagination::*;
