pub mod analysis;
pub mod candidate;
pub mod job_description;
pub mod user;
