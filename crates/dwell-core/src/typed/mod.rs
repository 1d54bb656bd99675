//! Typed - typed task kinds on top of the opaque task API.
//!
//! - **Surface (typed)**: `TaskKind`, `Handler<K>`
//! - **Inside (dyn)**: `DynHandler`, held by `TypedRegistry`

pub mod codec;
pub mod handler;
pub mod registry;
pub mod task;

pub use self::codec::{CodecError, ParameterCodec};
pub use self::handler::{DynHandler, Handler, HandlerError, TypedHandler};
pub use self::registry::{RegistryError, TypedRegistry};
pub use self::task::TaskKind;
