//! Command handlers, one module per subcommand.

pub mod call;
pub mod check;
pub mod servers;
pub mod tools;
