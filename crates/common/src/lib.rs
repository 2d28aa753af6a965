// threadspace-common: domain types and the cycle-safe value serializer

pub mod types;
pub mod value;
