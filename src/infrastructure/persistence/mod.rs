// SQLite pool and schema
pub mod database;

// Evolution history repository
pub mod evolution_store;
