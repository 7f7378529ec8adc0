pub mod policy;
pub mod replay_buffer;
pub mod trainer;

pub use policy::LinearPolicyBuilder;
pub use replay_buffer::ExperienceBufferBuilder;
pub use trainer::DistributedTrainerBuilder;
