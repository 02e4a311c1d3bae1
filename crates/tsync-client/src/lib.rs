//! tsync-client
//!
//! Everything that knows the upstream API's wire shape:
//!
//! - [`CollectionQuery`] builds the composite-cursor filter, ordering and page
//!   size for a collection request.
//! - [`xml`] parses response bodies into a small element tree and
//!   [`FromElement`] maps elements onto the shared snapshot types, one explicit
//!   function per resource kind.
//! - [`OutcomeDiff`] renders the XML patch document used to push outcomes.
//! - [`status`] is the pure callability policy over the rolling [`ApiStatus`].
//! - [`ApiClient`] is the reqwest-backed [`Upstream`]; tests and the in-memory
//!   harness provide their own.
//!
//! [`ApiStatus`]: tsync_schemas::ApiStatus

mod decode;
mod diff;
mod error;
mod http;
mod query;
pub mod status;
mod upstream;
pub mod xml;

pub use decode::{
    parse_collection, parse_timestamp, unwrap_resource, CollectionPage, DecodeError, FromElement,
    RegistrationItem,
};
pub use diff::{DiffOp, OutcomeDiff};
pub use error::{ApiError, ApiErrorKind};
pub use http::ApiClient;
pub use query::{CollectionQuery, RegistrationParent, API_ROOT};
pub use status::{ApiPolicy, HealthClass, Observation};
pub use upstream::{Exchange, ResourceFetch, ResourcePage, Upstream};
