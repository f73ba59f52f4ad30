//! Derive randomized generators, wire encoders and display renderers from a
//! single schema AST.
//!
//! All three derivations share one recursive descent ([`engine`]); each
//! supplies only its leaf table and union policy. Recursive schemas are
//! memoized per compilation, and hooks keyed by the `Identifier` annotation
//! replace structural derivation for a node.
pub mod annotations;
pub mod ast;
pub mod constraints;
pub mod document;
pub mod encode;
pub mod engine;
pub mod error;
pub mod filters;
pub mod generate;
pub mod guard;
pub mod hooks;
pub mod render;
pub mod value;

pub use ast::Ast;
pub use encode::{Encoder, compile_encoder, compile_encoder_with};
pub use error::{CompileError, DocumentError, EncodeError, RenderError, SampleError, WireError};
pub use generate::{Generator, compile_generator, compile_generator_with};
pub use guard::{Acceptor, StructuralGuard};
pub use hooks::HookRegistry;
pub use render::{Renderer, compile_renderer, compile_renderer_with};
pub use value::Value;
