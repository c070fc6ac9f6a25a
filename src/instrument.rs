//! Response instrumentation.
//!
//! [`Recorder`] decorates a [`ResponseWriter`]: every call is forwarded to the
//! inner writer with its original arguments, and the outcome (final status,
//! payload, redirect target) is kept on the side for the completion log.

use bytes::Bytes;
use http::StatusCode;
use serde_json::{Value, json};

use crate::response::{NativeResponse, ResponseWriter};

/// What the recorder observed. Last call wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Recorded {
    status: Option<StatusCode>,
    payload: Option<Value>,
    redirect: Option<String>,
}

impl Recorded {
    pub fn status(&self) -> Option<StatusCode> { self.status }

    /// The JSON document sent, or `{"text": ..}` for a raw send.
    pub fn payload(&self) -> Option<&Value> { self.payload.as_ref() }

    pub fn redirect(&self) -> Option<&str> { self.redirect.as_deref() }
}

/// Observing decorator around another writer.
///
/// The recorded status is read back from the wire response after each
/// forwarded call, so the log and the client always agree.
pub struct Recorder {
    inner: Box<dyn ResponseWriter>,
    recorded: Recorded,
}

impl Recorder {
    pub fn new(inner: Box<dyn ResponseWriter>) -> Self {
        Self { inner, recorded: Recorded::default() }
    }

    fn sync_status(&mut self) {
        self.recorded.status = Some(self.inner.native().status());
    }
}

impl ResponseWriter for Recorder {
    fn set_status(&mut self, status: StatusCode) {
        self.inner.set_status(status);
        self.sync_status();
    }

    fn send_json(&mut self, body: Value) {
        self.recorded.payload = Some(body.clone());
        self.recorded.redirect = None;
        self.inner.send_json(body);
        self.sync_status();
    }

    fn send_raw(&mut self, body: Bytes) {
        self.recorded.payload = Some(json!({ "text": String::from_utf8_lossy(&body) }));
        self.recorded.redirect = None;
        self.inner.send_raw(body);
        self.sync_status();
    }

    fn redirect(&mut self, location: &str) {
        self.recorded.payload = None;
        self.recorded.redirect = Some(location.to_owned());
        self.inner.redirect(location);
        self.sync_status();
    }

    fn native(&self) -> &NativeResponse { self.inner.native() }
    fn native_mut(&mut self) -> &mut NativeResponse { self.inner.native_mut() }
    fn recorded(&self) -> Option<&Recorded> { Some(&self.recorded) }
    fn into_native(self: Box<Self>) -> NativeResponse { self.inner.into_native() }
}
