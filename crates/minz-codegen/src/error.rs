//! Code-generator errors (spec §4.17, §7): both variants here are bugs
//! in the compiler, never user errors — a well-formed optimized MIR
//! must not reach either one. Modeled the same way `minz_diagnostics`
//! derives its `Diagnostic` enum with `thiserror`, kept separate
//! because these never belong in the user-facing diagnostics bag.

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("internal compiler error in `{function}`: {message}")]
    InternalCompilerError { function: String, message: String },

    #[error("register allocation exhausted in `{function}`: {message}")]
    RegisterAllocationExhausted { function: String, message: String },
}
