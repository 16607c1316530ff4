//! Generic building blocks: JSON Pointers, the state machine and its
//! walker, cycle detection and tree edits.

pub mod cycle;
pub mod machine;
pub mod pointer;
pub mod tree;
pub mod walker;
