use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of one interpreter instance inside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineHandle(pub u64);

/// Opaque reference to a function inside an interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackRef(pub i64);

/// Capability token naming a route handler inside the engine.
///
/// The core only stores it and passes it back on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackHandle {
    pub engine: EngineHandle,
    pub callback: CallbackRef,
}

impl CallbackHandle {
    pub fn new(engine: EngineHandle, callback: CallbackRef) -> Self {
        Self { engine, callback }
    }

    pub fn belongs_to(&self, engine: EngineHandle) -> bool {
        self.engine == engine
    }
}

impl fmt::Display for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.engine.0, self.callback.0)
    }
}
