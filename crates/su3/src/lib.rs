//! SU3: the signed container format used for I2P reseed bundles, router
//! updates, plugins and news feeds.
//!
//! The format is a fixed big-endian header followed by version, signer ID,
//! content and signature fields ([`wire`]), signed with PKCS#1 v1.5 RSA
//! over the unprefixed body digest ([`crypto`]). The layout must stay
//! bit-exact against the Go and Java implementations consuming these
//! files; `tests/compat.rs` pins it.

pub mod crypto;
pub mod error;
pub mod wire;

pub use error::Su3Error;
pub use wire::{SigType, Su3File};
pub use wire::{
    CONTENT_TYPE_NEWS, CONTENT_TYPE_PLUGIN, CONTENT_TYPE_RESEED, CONTENT_TYPE_ROUTER,
    CONTENT_TYPE_UNKNOWN, FILE_TYPE_HTML, FILE_TYPE_XML, FILE_TYPE_XMLGZ, FILE_TYPE_ZIP,
};
