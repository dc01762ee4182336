pub mod attempt_service;
pub mod grading_service;
pub mod integrity_service;
pub mod invite_service;
pub mod notification_service;
pub mod recording_service;
pub mod test_service;
