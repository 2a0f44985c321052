//! Core of the Errly error-reporting SDK
//!
//! This crate holds everything that does not depend on a particular host:
//!
//! - [`bus`]: synchronous typed publish/subscribe
//! - [`exception`]: traceback capture, frame filtering and the processing
//!   chain that produces a [`StructuredException`]
//! - [`integration`]: the [`Integration`] trait, its lifecycle and the
//!   registry a controller keeps integrations in
//! - [`wire`]: the encoding rules for records sent to the ingestion service

pub mod bus;
pub mod error;
pub mod events;
pub mod exception;
pub mod integration;
pub mod scope;
pub mod wire;

pub use bus::{DispatchReport, EventBus, Subscriber, SubscriberFailure};
pub use error::{ErrlyError, ErrlyResult};
pub use events::{ExceptionParsed, IntegrationInitialized, RequestInfo};
pub use exception::{
    CallbackChain, ExceptionCallback, FrameDetail, FrameExtractionCallback, RaisedException,
    RawFrame, StackFrameFilter, StructuredException, Traceback,
};
pub use integration::{
    capture_and_publish, HostProbe, Integration, IntegrationKind, IntegrationRegistry, Lifecycle,
    LifecycleState, SetupContext,
};
