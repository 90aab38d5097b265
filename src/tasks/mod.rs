pub mod assembler;
pub mod command_rx;
pub mod datalog;
pub mod dispatcher;
pub mod source;
