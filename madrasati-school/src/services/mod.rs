pub mod audit;
pub mod photo_service;
pub mod review_service;
pub mod school_service;
