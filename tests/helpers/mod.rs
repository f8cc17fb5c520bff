// Each test crate uses a different subset of these helpers
#![allow(dead_code, unused_imports)]

pub mod builders;
pub mod keys;

pub use builders::{basic_auth, foo_bar, IssuerBuilder};
pub use keys::{decode_token, key_manager, PRIVATE_PEM, PUBLIC_PEM};
