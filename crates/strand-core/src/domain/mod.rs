//! Domain model: outcome carrier, failure taxonomy, callback shapes.
//!
//! - **result**: `CompletionResult<T>`
//! - **errors**: `FlowError`
//! - **callback**: `Callback` / `Task` / `Transform` aliases, `Latch`, `call_guarded`

pub mod callback;
pub mod errors;
pub mod result;

pub(crate) use self::callback::deliver;
pub use self::callback::{Callback, Latch, Task, Transform, call_guarded, callback, task, transform};
pub use self::errors::{BoxError, FlowError, SharedError};
pub use self::result::CompletionResult;
