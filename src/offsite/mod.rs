//! Offsite copies
//!
//! [`TransferGateway`] bundles the newest base snapshot with the archived
//! segments and hands the bundle to an [`OffsiteTransport`].

mod gateway;
mod transport;

pub use gateway::{OffsiteReport, TransferGateway, PACKAGE_EXTENSION};
pub use transport::{OffsiteTransport, ScpTransport};
