//! Per-target override handlers.
//!
//! A handler replaces structural derivation for the node whose `Identifier`
//! annotation it is registered under. Each target has its own table; the
//! compiler for a target only ever consults that target's table.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use proptest::prelude::*;

use crate::annotations::Annotations;
use crate::encode::Encoder;
use crate::generate::Generator;
use crate::render::Renderer;
use crate::value::Value;

/// Receives the operations compiled for the node's children: type
/// parameters for a declaration, `from` for a refinement, nothing for a lazy
/// node.
pub type Handler<Op> = Arc<dyn Fn(Vec<Op>) -> Op + Send + Sync>;

pub struct Hooks<Op> {
    handlers: HashMap<String, Handler<Op>>,
}

#[derive(Default, Debug)]
pub struct HookRegistry {
    pub generator: Hooks<Generator>,
    pub encoder: Hooks<Encoder>,
    pub renderer: Hooks<Renderer>,
}

impl<Op> Hooks<Op> {
    pub fn new() -> Self { Self { handlers: HashMap::new() } }

    pub fn register(
        &mut self,
        identifier: impl Into<String>,
        handler: impl Fn(Vec<Op>) -> Op + Send + Sync + 'static,
    ) -> &mut Self {
        self.handlers.insert(identifier.into(), Arc::new(handler));
        self
    }

    pub fn lookup(&self, annotations: &Annotations) -> Option<&Handler<Op>> {
        self.handlers.get(annotations.identifier()?)
    }
}

impl<Op> Default for Hooks<Op> {
    fn default() -> Self { Self::new() }
}

impl<Op> fmt::Debug for Hooks<Op> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self { Self::default() }

    /// Handlers for the identifiers [`crate::filters`] attaches.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.generator.register(crate::filters::UUID_IDENTIFIER, |_| uuid_v4());
        registry
    }
}

/// Version-4, variant-1 UUIDs in lower-case hex.
fn uuid_v4() -> Generator {
    Generator::from_strategy(proptest::array::uniform16(any::<u8>()).prop_map(|mut b| {
        b[6] = (b[6] & 0x0f) | 0x40;
        b[8] = (b[8] & 0x3f) | 0x80;
        let hex: String = b.iter().map(|x| format!("{x:02x}")).collect();
        Value::String(format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8], &hex[8..12], &hex[12..16], &hex[16..20], &hex[20..32]
        ))
    }))
}

// ------------------------------- Tests ------------------------------------ //
