//! Process tree inspection and termination

pub mod table;
pub mod terminator;

pub use table::{ProcessTable, Signal, SystemProcessTable};
pub use terminator::{
    ProcessTreeTerminator, RootProcess, Stage, TerminationReport, TerminationStrategy,
};
