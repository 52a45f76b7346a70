pub mod embedding_store;
pub mod records;
