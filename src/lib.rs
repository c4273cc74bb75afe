//! Nova Sound FX browser bundle.
//!
//! On `wasm32` this crate is the `cdylib` loaded by the page; natively it
//! only exposes the page-data decoding used by the bundle and the lint tool.

pub mod page_data;

#[cfg(target_arch = "wasm32")]
mod bundle;

#[cfg(target_arch = "wasm32")]
pub use bundle::NovaSoundFx;
