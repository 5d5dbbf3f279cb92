pub mod learner;
pub mod manager;

pub use learner::LearnerContext;
pub use manager::ManagerContext;
