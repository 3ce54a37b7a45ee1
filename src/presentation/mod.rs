//! Pure serialization of hydrated state into protocol views.

pub mod blobs;
pub mod views;

pub use blobs::{ImageFormat, absolutize, blob_url, display_label, presented_handle};
pub use views::{serialize_post, serialize_profile};
