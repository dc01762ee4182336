pub mod answer;
pub mod assignment;
pub mod attempt;
pub mod event;
pub mod question;
pub mod recording;
pub mod user;
