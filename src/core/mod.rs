pub mod config;
pub mod environment;
pub mod policy;
pub mod session;
pub mod sources;

pub use config::Config;
pub use environment::{ElementRef, Environment, SelectChoice, Selector, SelectorKind};
pub use policy::{ActionPolicy, DecisionContext, FailedStep, FailureAnnotation, PolicyStep, ScriptedPolicy};
pub use session::SessionState;
pub use sources::{FrameSource, JobAdvancer, NullTextExtractor, TextExtractor, TextToken};
