//! Input/output and status reporting.

pub mod store;
#[cfg(feature = "persistence")]
pub mod utils;

/// How much non-critical status information to print.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Verbosity {
    #[default]
    Quiet,
    Messages,
}

impl Verbosity {
    /// Creates a verbosity from a flag telling whether messages should be printed.
    pub fn from_flag(print_messages: bool) -> Self {
        if print_messages {
            Self::Messages
        } else {
            Self::Quiet
        }
    }

    pub fn print_messages(&self) -> bool {
        match self {
            Self::Quiet => false,
            Self::Messages => true,
        }
    }
}
