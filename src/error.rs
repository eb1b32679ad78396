use blatter_optimize::newton::NewtonError;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug)]
pub enum BlatterError {
    /// Settings that cannot produce a consistent grid hierarchy or solve.
    InvalidConfiguration(String),
    /// Input fields whose shape does not match the grid.
    InvalidInput(String),
    /// A collective operation failed or was used inconsistently.
    Communication(String),
    /// The nonlinear solve diverged or one of its linear solves broke down.
    SolveFailed(NewtonError),
}

impl Display for BlatterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlatterError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            BlatterError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            BlatterError::Communication(msg) => write!(f, "Communication failure: {}", msg),
            BlatterError::SolveFailed(err) => write!(f, "Stress balance solve failed: {}", err),
        }
    }
}

impl Error for BlatterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BlatterError::SolveFailed(err) => Some(err),
            _ => None,
        }
    }
}

/// Communication failures inside the Newton iteration are reported as such, every other
/// failure as a failed solve.
impl From<NewtonError> for BlatterError {
    fn from(err: NewtonError) -> Self {
        let communication = match &err {
            NewtonError::FunctionError(e) | NewtonError::JacobianError(e) | NewtonError::LineSearchError(e) => {
                match e.downcast_ref::<BlatterError>() {
                    Some(BlatterError::Communication(msg)) => Some(msg.clone()),
                    _ => None,
                }
            }
            _ => None,
        };
        match communication {
            Some(msg) => BlatterError::Communication(msg),
            None => BlatterError::SolveFailed(err),
        }
    }
}
