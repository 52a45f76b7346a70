pub mod identity_context;
pub mod index_folder_use_case;
pub mod index_reporter;
pub mod query_by_image_use_case;
