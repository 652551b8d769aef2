use thiserror::Error;

/// Largest agent capacity a simulation accepts.
pub const MAX_CAPACITY: usize = 1 << 22;

/// Hard failures. Everything else is sanitized instead of rejected.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("simulation capacity must be at least one agent")]
    ZeroCapacity,
    #[error("capacity {requested} exceeds the supported maximum of {max}")]
    CapacityTooLarge { requested: usize, max: usize },
    #[error("entropy source unavailable: {0}")]
    Entropy(String),
    #[error("invalid settings document: {0}")]
    Settings(#[from] serde_json::Error),
}

pub(crate) fn check_capacity(capacity: usize) -> Result<usize, SimError> {
    if capacity == 0 {
        return Err(SimError::ZeroCapacity);
    }
    if capacity > MAX_CAPACITY {
        return Err(SimError::CapacityTooLarge {
            requested: capacity,
            max: MAX_CAPACITY,
        });
    }
    Ok(capacity)
}

#[cfg(test)]
mod tests {
    use super::{check_capacity, SimError, MAX_CAPACITY};

    #[test]
    fn capacity_limits_are_enforced() {
        assert!(matches!(check_capacity(0), Err(SimError::ZeroCapacity)));
        assert!(matches!(
            check_capacity(MAX_CAPACITY + 1),
            Err(SimError::CapacityTooLarge { .. })
        ));
        assert_eq!(check_capacity(MAX_CAPACITY).ok(), Some(MAX_CAPACITY));
    }

    #[test]
    fn messages_name_the_problem() {
        let err = SimError::CapacityTooLarge {
            requested: 10,
            max: 5,
        };
        assert_eq!(
            err.to_string(),
            "capacity 10 exceeds the supported maximum of 5"
        );
    }
}
