pub mod engines;
pub mod hybrid;
pub mod keyword;
pub mod queue;
