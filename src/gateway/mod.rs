//! Gateway surface: inbound message dispatch, agent process hosting,
//! reply lanes, and cooperative run cancellation.

pub mod agent;
pub mod dispatcher;
pub mod http;
pub mod reply_queue;
pub mod run_host;

pub use dispatcher::{DispatchOutcome, Dispatcher, GatewayDeps, InboundMessage};
pub use reply_queue::ReplyQueue;
pub use run_host::{EmbeddedRunHost, ProcessSupervisor};
