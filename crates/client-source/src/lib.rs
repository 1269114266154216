//! Seed authentication and handle sourcing for the Dataverse connection pool.
//!
//! A [`ClientSource`] owns the identity for one named source and yields a
//! cached, ready-to-clone seed handle. Authentication mechanics (OAuth token
//! acquisition, secret resolution, certificate loading) are explicitly out of
//! scope here; a source only needs to produce something implementing
//! [`Dispatchable`].

mod backoff;
mod dispatchable;
mod error;
mod source;

pub use dispatchable::Dispatchable;
pub use error::{SeedError, SeedErrorKind};
pub use source::{ClientSource, ConnectionStringSource, PreAuthenticatedHandleSource};
