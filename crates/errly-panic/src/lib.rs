//! Panic hook integration for the Errly SDK
//!
//! [`PanicHookIntegration`] chains itself in front of the process panic hook.
//! Each panic is parsed and published, then handed to the previous hook so
//! the usual panic message is still printed.

mod hook;

pub use hook::PanicHookIntegration;
