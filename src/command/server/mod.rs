mod command;
mod error;
mod http_server;
mod listeners;
mod server_context;

pub use command::{Command, Options};
pub use error::Error;
pub use server_context::ServerContext;
