// Evolution engine use cases
pub mod evolution;
