pub mod ai_assistant;
pub mod constants;
pub mod data_backend;
pub mod data_types;
pub mod db_operations;
pub mod document;
pub mod errors;
pub mod shared_main;
pub mod shopping_list_aggregator;
pub mod shopping_list_generator;
