//! Authentication for SSH connections.
//!
//! The private key is loaded once, before any network activity, so an
//! unreadable key fails the session before a connection is attempted. It is
//! then offered to the server through the [`AuthStrategy`] trait.
//!
//! # Available Strategies
//!
//! - [`KeyAuth`]: Private key file authentication

mod key;
mod traits;

pub use key::KeyAuth;
pub use traits::AuthStrategy;
