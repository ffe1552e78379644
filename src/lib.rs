pub mod config;
pub mod core;
pub mod error;
pub mod http;
pub mod loader;
pub mod logging;
pub mod resolver;

pub use config::Config;
pub use core::{flatten_parts, get_at_path, set_at_path, EditMode, JsonPath, PathSegment};
pub use error::{AddressingError, CancelledError, FetchError, ParseError, ReferenceError};
pub use http::{Fetcher, HttpClient, HttpMethod, Persister};
pub use loader::{DocumentKind, FieldEdit, LoadSession, LoadedDocument, Loader};
pub use logging::{Level, Logger};
pub use resolver::{Resolution, Resolver};
