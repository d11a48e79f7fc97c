#![crate_name = "zvm"]

#[macro_use]
extern crate lazy_static;

pub mod call_stack;
pub mod config;
pub mod display_headless;
pub mod display_terminal;
pub mod display_trait;
pub mod error;
pub mod header;
pub mod input;
pub mod instruction;
pub mod interpreter;
pub mod memory;
pub mod opcode_tables;
pub mod opcodes_display;
pub mod opcodes_io;
pub mod opcodes_math;
pub mod opcodes_memory;
pub mod opcodes_object;
pub mod opcodes_stack;
pub mod text;
pub mod vm;
pub mod zobject;
pub mod zrand;

#[doc(hidden)]
pub mod test_utils;
