//! URL handling module for linkhound
//!
//! This module provides relative-to-absolute link resolution, used by the
//! processor factory and the processor handler, and the normalization that
//! keys the already-visited cache.

mod normalize;
mod resolve;

pub use normalize::{cache_key, normalize_url};
pub use resolve::resolve_relative;
