pub mod backend;
pub mod catalog;
pub mod object_store;
pub mod s3_store;
pub mod static_file_service;
pub mod upload;
