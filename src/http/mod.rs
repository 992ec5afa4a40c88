//! HTTP protocol layer module
//!
//! Response builders shared by every route.

pub mod response;

// Re-export commonly used types
pub use response::{
    build_404_response, build_405_response, build_html_response, build_json_response,
    build_text_response,
};
