//! Privilege-separated execution of scheduler mutations.
//!
//! Every mutating request runs in a short-lived worker that becomes the
//! acting user before it touches the scheduler:
//!
//! 1. [`PrivilegedExecutor::invoke`] resolves the caller through the
//!    [`UserDatabase`] and builds a [`WorkUnit`].
//! 2. The unit is handed to a worker (see [`Isolation`]), normally a child
//!    process running the hidden `worker` subcommand.
//! 3. The worker's [`WorkerRuntime`] drops to the caller's identity,
//!    connects to the scheduler, resolves the target again and performs
//!    exactly one [`Operation`].
//! 4. The worker reports one [`WorkerMessage`]; the executor turns it back
//!    into a result, or into a backend-interface error if the worker stayed
//!    silent, crashed or ran past the timeout.
//!
//! # Components
//!
//! - [`identity`]: account lookup and the identity drop
//! - [`operation`]: the units of work and their success messages
//! - [`channel`]: work unit and message framing
//! - [`runtime`]: the worker body
//! - [`executor`]: the parent-side state machine

pub mod channel;
pub mod executor;
pub mod identity;
pub mod isolation;
pub mod operation;
pub mod runtime;

pub use channel::{decode_single, WorkUnit, WorkerMessage};
pub use executor::{Invocation, InvocationState, PrivilegedExecutor};
pub use identity::{Identity, NoDrop, PrivilegeDrop, Setuid, SystemUsers, UserDatabase};
pub use isolation::Isolation;
pub use operation::{Operation, Outcome, OutputStream, MAX_OUTPUT_BYTES, NOT_AVAILABLE};
pub use runtime::WorkerRuntime;
