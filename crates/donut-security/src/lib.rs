//! Token encryption for donut hole markers.
//!
//! Donut hole markers travel inside publicly served HTML, so the action
//! identity they carry is sealed before it is embedded:
//! - `Encryptor` - Pluggable encrypt/decrypt capability
//! - `SealingEncryptor` - ChaCha20-Poly1305 tokens in URL-safe base64
//!
//! # Example
//!
//! ```ignore
//! use donut_security::{Encryptor, SealingEncryptor};
//!
//! let encryptor = SealingEncryptor::generate();
//! let token = encryptor.encrypt("{\"a\":\"Clock\"}")?;
//! assert_eq!(encryptor.decrypt(&token)?, "{\"a\":\"Clock\"}");
//! ```

mod encryptor;

pub use encryptor::*;
