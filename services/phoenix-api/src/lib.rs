//! HTTP surface of the Phoenix OKR dashboard: one JSON document, its outlets
//! and its backup log, served over axum.

pub mod api;
pub mod transport;
pub mod transport_axum;
