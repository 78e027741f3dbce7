//! Data fetching and refresh primitives for the dashboard.
//!
//! A [`RequestController`] owns the lifecycle of one logical resource: it
//! calls an injected producer, tracks loading/error/data state, and makes
//! sure only the most recently issued request may publish a result. A
//! [`RefreshScheduler`] re-triggers requests on a fixed period. The
//! [`dashboard`] module wires both to the dashboard API surface.

pub mod controller;
pub mod dashboard;
pub mod error;
pub mod preferences;
pub mod refresh;
pub mod state;
pub mod telemetry;
pub mod theme;
pub mod transform;

pub use controller::{
    FetchOptions, FetchTask, Producer, Refetch, RequestController, producer,
};
pub use error::{FetchError, FetchOutcome, RefreshError};
pub use refresh::RefreshScheduler;
pub use state::{FetchState, RequestState, StateView};
