//! Decorators around a [`DeviceService`]
//!
//! Each decorator implements [`DeviceService`] itself and forwards to the
//! service it wraps, recording something around the call. They compose by
//! nesting:
//!
//! ```text
//! InstrumentingMiddleware ──► LoggingMiddleware ──► Device
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::{info, warn};

use crate::device::{ConnectRequest, DeviceService, SendMessageRequest};
use crate::error::DeviceError;

pub const REQUEST_COUNT: &str = "device_virtual_request_count";
pub const REQUEST_LATENCY: &str = "device_virtual_request_latency_seconds";

/// Registers metric descriptions with the installed recorder, if any.
pub fn describe_metrics() {
    describe_counter!(REQUEST_COUNT, "Number of requests received.");
    describe_histogram!(REQUEST_LATENCY, "Total duration of requests in seconds.");
}

pub struct LoggingMiddleware<S> {
    next: S,
}

impl<S: DeviceService> LoggingMiddleware<S> {
    pub fn new(next: S) -> Self {
        Self { next }
    }
}

fn log_call(method: &'static str, took: Duration, result: Option<&Result<(), DeviceError>>) {
    match result {
        Some(Err(err)) => warn!(method, ?took, %err, "Request failed"),
        _ => info!(method, ?took, "Request handled"),
    }
}

#[async_trait]
impl<S: DeviceService> DeviceService for LoggingMiddleware<S> {
    async fn health(&self) -> bool {
        self.next.health().await
    }

    async fn connect(&self, request: ConnectRequest) -> Result<(), DeviceError> {
        let begin = Instant::now();
        let result = self.next.connect(request).await;
        log_call("connect", begin.elapsed(), Some(&result));
        result
    }

    async fn send_message(&self, request: SendMessageRequest) -> Result<(), DeviceError> {
        let begin = Instant::now();
        let result = self.next.send_message(request).await;
        log_call("send_message", begin.elapsed(), Some(&result));
        result
    }

    async fn disconnect(&self) {
        let begin = Instant::now();
        self.next.disconnect().await;
        log_call("disconnect", begin.elapsed(), None);
    }
}

pub struct InstrumentingMiddleware<S> {
    next: S,
}

impl<S: DeviceService> InstrumentingMiddleware<S> {
    pub fn new(next: S) -> Self {
        Self { next }
    }
}

fn observe(method: &'static str, begin: Instant) {
    counter!(REQUEST_COUNT, "method" => method).increment(1);
    histogram!(REQUEST_LATENCY, "method" => method).record(begin.elapsed().as_secs_f64());
}

#[async_trait]
impl<S: DeviceService> DeviceService for InstrumentingMiddleware<S> {
    async fn health(&self) -> bool {
        self.next.health().await
    }

    async fn connect(&self, request: ConnectRequest) -> Result<(), DeviceError> {
        let begin = Instant::now();
        let result = self.next.connect(request).await;
        observe("connect", begin);
        result
    }

    async fn send_message(&self, request: SendMessageRequest) -> Result<(), DeviceError> {
        let begin = Instant::now();
        let result = self.next.send_message(request).await;
        observe("send_message", begin);
        result
    }

    async fn disconnect(&self) {
        let begin = Instant::now();
        self.next.disconnect().await;
        observe("disconnect", begin);
    }
}
