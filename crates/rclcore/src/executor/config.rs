use crate::error::{Error, Result};

/// Sizing for a [`MultiThreadedExecutor`](crate::MultiThreadedExecutor).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExecutorConfig {
    /// Worker threads to run. `None` uses the hardware parallelism.
    pub number_of_threads: Option<usize>,
}

impl ExecutorConfig {
    pub const fn with_threads(number_of_threads: usize) -> Self {
        Self {
            number_of_threads: Some(number_of_threads),
        }
    }

    /// The worker count this configuration asks for.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if zero threads were requested.
    pub fn resolve(&self) -> Result<usize> {
        match self.number_of_threads {
            None => Ok(default_number_of_threads()),
            Some(0) => Err(Error::InvalidConfig {
                reason: String::from("number_of_threads must be at least 1"),
            }),
            Some(n) => Ok(n),
        }
    }
}

/// Hardware parallelism, never less than one.
pub fn default_number_of_threads() -> usize {
    num_cpus::get().max(1)
}
