pub mod assembler;
pub mod calculations;
pub mod ranking;
pub mod solver;

pub use assembler::{AssemblyOptions, BatchAssembler, Pairing};
pub use solver::ScheduleSolver;
