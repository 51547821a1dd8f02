pub mod document_service;
pub mod file_store;
