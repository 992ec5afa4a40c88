//! Request handler module
//!
//! Responsible for request routing dispatch and rendering of the device pages.

pub mod pages;
pub mod router;

// Re-export main entry point
pub use router::handle_request;
