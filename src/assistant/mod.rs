//! Turn-based conversational assistant session
//!
//! This module wraps the external streaming assistant:
//! - Wire message shapes and subjects (`messages`)
//! - The transport capability trait and its NATS implementation (`link`)
//! - The session lifecycle state machine (`state`)
//! - The session wrapper with turn handling (`session`)

pub mod link;
pub mod messages;
pub mod session;
pub mod state;

pub use link::{AssistantLink, NatsAssistantLink};
pub use messages::{AssistantEventMessage, AssistantOpenRequest, RealtimeInputMessage};
pub use session::{AssistantChunk, AssistantChunkCallback, ConversationalSession};
pub use state::{next_state, SessionEvent, SessionState};
