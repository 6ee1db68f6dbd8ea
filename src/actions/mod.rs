pub mod base;
pub mod executor;
pub mod request;

pub use base::{
    Action, ActionFailure, ActionKind, ActionOutcome, ActionReport, ClickTarget, ControlTarget, ScrollTarget,
};
pub use executor::{ActionExecutor, FrameBounds};
pub use request::{parse_policy_response, parse_request, ActionRequest};
