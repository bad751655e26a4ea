//! Virtual device gateway
//!
//! A small HTTP API that drives a single simulated device: connect it to an
//! MQTT broker over mutual TLS, publish on its behalf, disconnect it.
//!
//! ```text
//! HTTP ──► api ──► middleware ──► device ──► DeviceHandle worker ──► mqtt
//!                                   │
//!                                   └──► tls (client config from PEM)
//! ```

pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod middleware;
pub mod mqtt;
pub mod server;
pub mod tls;
