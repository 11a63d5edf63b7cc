//! Integration test crate for flowline.
//!
//! All content lives in the `tests/` directory; this library target exists
//! only to anchor the crate in the workspace.
