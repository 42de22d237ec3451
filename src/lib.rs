// Library entry exposing toolchain modules.
pub mod asm;
pub mod cli;
pub mod convert;
pub mod error;
pub mod grammar;
pub mod isa;
