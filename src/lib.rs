// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

pub mod app;
pub mod body;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod exception;
pub mod param;
pub mod parser;
pub mod path;
pub mod request;
pub mod response;
pub mod router;
pub mod server;

pub use app::{App, Lifecycle};
pub use body::Body;
pub use config::Config;
pub use connection::{Connection, ConnectionState, Transport};
pub use dispatcher::{Dispatcher, Middleware};
pub use exception::Exception;
pub use path::{Params, Pattern};
pub use request::Request;
pub use response::Response;
pub use router::{Handler, HandlerError, HandlerResult, Router};
pub use server::Server;
