//! Actor runtime
//!
//! A minimal actor model on top of tokio tasks and mpsc channels:
//!
//! - [`base`]: mailbox, envelope and message loop shared by every actor
//! - [`message`]: the EXECUTE / RESULT / ERROR / TERMINATE protocol
//! - [`vertex`]: one actor per workflow vertex
//! - [`coordinator`]: one actor per workflow run

pub mod base;
pub mod coordinator;
pub mod message;
pub mod vertex;

pub use base::{
    mailbox, spawn_actor, Actor, ActorControl, ActorHandle, ActorId, ActorMessage, Address,
    CorrelationId, Mailbox,
};
pub use coordinator::WorkflowCoordinatorActor;
pub use message::{ActorMessageType, CoordinatorEvent, VertexCommand};
pub use vertex::VertexActor;
