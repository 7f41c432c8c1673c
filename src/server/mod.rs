pub mod admin;
pub mod builder;
pub mod handler;
pub mod listener;

pub use admin::{spawn_admin_server, AdminState};
pub use builder::ServerBuilder;
pub use handler::RequestHandler;
