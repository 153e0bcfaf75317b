//! Delivery of synchronized data to application callbacks.
//!
//! One registry serves all five payload kinds. Payloads are only built for
//! kinds that currently have subscribers; in particular no point cloud is
//! computed unless a cloud-consuming subscriber exists.

mod payload;
mod registry;

pub use payload::{Callback, CallbackKind, FusedFrame, HandlerError, HandlerResult};
pub use registry::{CallbackRegistry, DispatchReport, SubscriptionHandle};
